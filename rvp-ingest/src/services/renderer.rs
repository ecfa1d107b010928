//! Chart renderer
//!
//! Turns the accumulated results into an SVG document. The pipeline treats
//! the output as an opaque payload.

use crate::models::{ScoredRecord, SCORE_SCALE};
use crate::pipeline::ChartWindow;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Produces a visual artifact from the full result list
pub trait Renderer: Send + Sync {
    fn render(&self, results: &[ScoredRecord], window: &ChartWindow, merged: bool) -> String;
}

/// Windows longer than this are plotted per week instead of per day
pub const WEEKLY_THRESHOLD_DAYS: u32 = 90;

const WIDTH: f64 = 250.0;
const MERGED_WIDTH: f64 = 750.0;
const HEIGHT: f64 = 250.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 50.0;
const MARGIN_LEFT: f64 = 30.0;

/// One plotted score series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Pro,
    Con,
    Avg,
}

impl Series {
    const ALL: [Series; 3] = [Series::Pro, Series::Con, Series::Avg];

    fn color(self) -> &'static str {
        match self {
            Series::Pro => "green",
            Series::Con => "red",
            Series::Avg => "blue",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Series::Pro => "Pro Score",
            Series::Con => "Con Score",
            Series::Avg => "Avg Score",
        }
    }

    fn value(self, record: &ScoredRecord) -> f64 {
        match self {
            Series::Pro => record.score_a(),
            Series::Con => record.score_b(),
            Series::Avg => record.score_avg(),
        }
    }
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Points of one series: undated records skipped, weekly buckets for long
/// windows, values sharing a date averaged, sorted by date
pub fn series_points(
    results: &[ScoredRecord],
    window: &ChartWindow,
    series: Series,
) -> Vec<(NaiveDate, f64)> {
    let weekly = window.duration_in_days > WEEKLY_THRESHOLD_DAYS;
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();

    for record in results {
        let Some(date) = record.date() else { continue };
        let x = if weekly { week_start(date) } else { date };
        let bucket = buckets.entry(x).or_insert((0.0, 0));
        bucket.0 += series.value(record);
        bucket.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(date, (total, count))| (date, total / count as f64))
        .collect()
}

/// SVG renderer
///
/// Merged mode draws one wide chart with all three series; split mode
/// draws three narrow charts side by side. Both are wrapped in a single
/// `<svg>` root.
#[derive(Debug, Clone, Default)]
pub struct SvgRenderer;

impl SvgRenderer {
    pub fn new() -> Self {
        Self
    }
}

struct Frame<'a> {
    x_offset: f64,
    width: f64,
    window: &'a ChartWindow,
}

impl Frame<'_> {
    fn x(&self, date: NaiveDate) -> f64 {
        let span = (self.window.max_date - self.window.min_date).num_days().max(1) as f64;
        let offset = (date - self.window.min_date).num_days() as f64;
        MARGIN_LEFT + offset / span * (self.width - MARGIN_LEFT - MARGIN_RIGHT)
    }

    fn y(&self, score: f64) -> f64 {
        let plot_height = HEIGHT - MARGIN_BOTTOM - MARGIN_TOP;
        HEIGHT - MARGIN_BOTTOM - score / SCORE_SCALE * plot_height
    }

    fn open(&self, out: &mut String, title: &str) {
        let _ = write!(
            out,
            r#"<svg x="{:.0}" y="0" width="{:.0}" height="{:.0}">"#,
            self.x_offset, self.width, HEIGHT
        );
        let _ = write!(
            out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle" font-size="12px">{}</text>"#,
            (MARGIN_LEFT + self.width + MARGIN_RIGHT) / 2.0,
            MARGIN_TOP / 2.0,
            title
        );
        self.axes(out);
    }

    fn axes(&self, out: &mut String) {
        let baseline = HEIGHT - MARGIN_BOTTOM;
        let right = self.width - MARGIN_RIGHT;
        let _ = write!(
            out,
            r#"<g class="axis"><line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/><line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="black"/>"#,
            MARGIN_LEFT, baseline, right, baseline, MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, baseline
        );

        for tick in 0..=SCORE_SCALE as u32 {
            let y = self.y(f64::from(tick));
            let _ = write!(
                out,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-size="10px">{}</text>"#,
                MARGIN_LEFT - 4.0,
                y + 3.0,
                tick
            );
        }

        let span = (self.window.max_date - self.window.min_date).num_days();
        for date in [
            self.window.min_date,
            self.window.min_date + Duration::days(span / 2),
            self.window.max_date,
        ] {
            let x = self.x(date);
            let _ = write!(
                out,
                r#"<text x="{:.1}" y="{:.1}" text-anchor="end" font-size="10px" transform="rotate(-60 {:.1} {:.1})">{}</text>"#,
                x,
                baseline + 12.0,
                x,
                baseline + 12.0,
                date.format("%Y-%m-%d")
            );
        }
        out.push_str("</g>");
    }

    fn plot(&self, out: &mut String, points: &[(NaiveDate, f64)], color: &str) {
        out.push_str("<g>");
        for (date, score) in points {
            let _ = write!(
                out,
                r#"<circle class="dot" r="2.5" cx="{:.1}" cy="{:.1}" fill="{}" opacity="0.3"/>"#,
                self.x(*date),
                self.y(*score),
                color
            );
        }
        out.push_str("</g>");

        if points.is_empty() {
            return;
        }
        let mut path = String::new();
        for (i, (date, score)) in points.iter().enumerate() {
            let command = if i == 0 { 'M' } else { 'L' };
            let _ = write!(path, "{}{:.1},{:.1}", command, self.x(*date), self.y(*score));
        }
        let _ = write!(
            out,
            r#"<path d="{}" fill="none" stroke="{}"/>"#,
            path, color
        );
    }

    fn close(&self, out: &mut String) {
        out.push_str("</svg>");
    }
}

impl Renderer for SvgRenderer {
    fn render(&self, results: &[ScoredRecord], window: &ChartWindow, merged: bool) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}">"#,
            MERGED_WIDTH, HEIGHT
        );

        if merged {
            let frame = Frame {
                x_offset: 0.0,
                width: MERGED_WIDTH,
                window,
            };
            frame.open(&mut out, "Merged Chart");
            for series in Series::ALL {
                let points = series_points(results, window, series);
                frame.plot(&mut out, &points, series.color());
            }
            frame.close(&mut out);
        } else {
            for (i, series) in Series::ALL.into_iter().enumerate() {
                let frame = Frame {
                    x_offset: i as f64 * WIDTH,
                    width: WIDTH,
                    window,
                };
                frame.open(&mut out, series.title());
                let points = series_points(results, window, series);
                frame.plot(&mut out, &points, series.color());
                frame.close(&mut out);
            }
        }

        out.push_str("</svg>");
        out
    }
}
