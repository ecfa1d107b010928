//! Records and page identifiers

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Upper bound of a scaled score; scorer output in `[0, 1]` is multiplied by this
pub const SCORE_SCALE: f64 = 5.0;

/// Identifier of one page of remote data
///
/// Pages are numbered from 1. Identifiers are issued by the
/// [`PageSequencer`](crate::pipeline::PageSequencer); a manual retry is the
/// only path that fetches the same identifier twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(u64);

impl PageId {
    /// First page of every run
    pub const FIRST: PageId = PageId(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for PageId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw record as returned by the extractor
///
/// `text_a` / `text_b` are the two free-text fields that get scored
/// (pros and cons of a review). Every other field is carried through
/// untouched in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(alias = "pros")]
    pub text_a: String,
    #[serde(alias = "cons")]
    pub text_b: String,
    /// Publication date; records without one are kept but not charted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl RawRecord {
    pub fn new(text_a: impl Into<String>, text_b: impl Into<String>) -> Self {
        Self {
            text_a: text_a.into(),
            text_b: text_b.into(),
            date: None,
            metadata: Map::new(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Parameters forwarded with every fetch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Records dated before this are discarded by the extractor
    pub min_date: NaiveDate,
}

/// Result of fetching one page
///
/// `records` is present exactly when `status` is 200. A present but empty
/// list is the end-of-pages signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub status: i32,
    pub records: Option<Vec<RawRecord>>,
}

impl FetchOutcome {
    pub const SUCCESS: i32 = 200;
    /// Status used when no response came back at all
    pub const UNREACHABLE: i32 = -1;

    pub fn success(records: Vec<RawRecord>) -> Self {
        Self {
            status: Self::SUCCESS,
            records: Some(records),
        }
    }

    /// Build an outcome from a raw status, discarding records unless it is 200
    pub fn from_status(status: i32, records: Vec<RawRecord>) -> Self {
        if status == Self::SUCCESS {
            Self::success(records)
        } else {
            Self::failure(status)
        }
    }

    /// Failed fetch; a status of 200 here is coerced to `UNREACHABLE`
    pub fn failure(status: i32) -> Self {
        let status = if status == Self::SUCCESS {
            Self::UNREACHABLE
        } else {
            status
        };
        Self {
            status,
            records: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.records.is_some()
    }

    /// Successful response with zero records
    pub fn is_end_of_pages(&self) -> bool {
        matches!(&self.records, Some(records) if records.is_empty())
    }
}

/// A raw record plus its three scores on the `[0, 5]` scale
///
/// Immutable once built; `score_avg` is always `(score_a + score_b) / 2`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    record: RawRecord,
    score_a: f64,
    score_b: f64,
    score_avg: f64,
}

impl ScoredRecord {
    /// Scale two scorer outputs in `[0, 1]` and attach them to `record`
    pub fn from_unit_scores(record: RawRecord, unit_a: f64, unit_b: f64) -> Self {
        let score_a = unit_a * SCORE_SCALE;
        let score_b = unit_b * SCORE_SCALE;
        Self {
            record,
            score_a,
            score_b,
            score_avg: (score_a + score_b) / 2.0,
        }
    }

    pub fn record(&self) -> &RawRecord {
        &self.record
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.record.date
    }

    pub fn score_a(&self) -> f64 {
        self.score_a
    }

    pub fn score_b(&self) -> f64 {
        self.score_b
    }

    pub fn score_avg(&self) -> f64 {
        self.score_avg
    }
}
