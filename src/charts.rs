//! Chart-ready views of an analysis result.
//!
//! Everything here is pure: missing or malformed fields fall back to
//! defaults and no function can fail.

use crate::models::AnalysisResult;

pub const FEEDBACK_PLACEHOLDER: &str = "—";

const SCORE_COLOR: &str = "#3b82f6";
const REMAINING_COLOR: &str = "#e5e7eb";
const FOUND_COLOR: &str = "#10b981";
const MISSING_COLOR: &str = "#f59e0b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPoint {
    pub label: &'static str,
    pub value: u32,
    pub color: &'static str,
}

/// `(label, value, color)`
type Slice = (&'static str, u32, &'static str);

impl From<Slice> for DataPoint {
    fn from((label, value, color): Slice) -> Self {
        Self {
            label,
            value,
            color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartDataset {
    pub points: Vec<DataPoint>,
}

impl ChartDataset {
    fn pair(first: Slice, second: Slice) -> Self {
        Self {
            points: vec![first.into(), second.into()],
        }
    }

    pub fn values(&self) -> Vec<u32> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn total(&self) -> u32 {
        self.points.iter().map(|p| p.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub score: ChartDataset,
    pub keywords: ChartDataset,
    pub subscores: Vec<(String, f64)>,
    pub feedback: String,
}

/// `None` when there is no result to show yet.
pub fn project(result: Option<&AnalysisResult>) -> Option<Projection> {
    let result = result?;
    Some(Projection {
        score: score_dataset(result),
        keywords: keyword_dataset(result),
        subscores: subscore_list(result),
        feedback: feedback(result),
    })
}

/// The service may send the score as `manual_score` or `ats_score`. A
/// non-zero manual score wins; a zero or missing one falls through to the
/// ATS score, then to 0.
pub fn canonical_score(result: &AnalysisResult) -> u32 {
    let raw = result
        .manual_score
        .filter(|score| *score != 0.0)
        .or(result.ats_score)
        .unwrap_or(0.0);
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u32
}

pub fn score_dataset(result: &AnalysisResult) -> ChartDataset {
    let score = canonical_score(result);
    ChartDataset::pair(
        ("Score", score, SCORE_COLOR),
        ("Remaining", 100 - score, REMAINING_COLOR),
    )
}

pub fn keyword_dataset(result: &AnalysisResult) -> ChartDataset {
    let found = result.found_keywords.as_ref().map_or(0, Vec::len);
    let missing = result.missing_keywords.as_ref().map_or(0, Vec::len);
    ChartDataset::pair(
        ("Found", saturate(found), FOUND_COLOR),
        ("Missing", saturate(missing), MISSING_COLOR),
    )
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn subscore_list(result: &AnalysisResult) -> Vec<(String, f64)> {
    result.subscores.clone()
}

pub fn feedback(result: &AnalysisResult) -> String {
    match result.ai_feedback.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => FEEDBACK_PLACEHOLDER.to_string(),
    }
}

/// Parses `#rrggbb`; anything else is mid grey.
pub fn hex_to_rgb(color: &str) -> (u8, u8, u8) {
    let parse = |hex: &str| -> Option<(u8, u8, u8)> {
        let hex = hex.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
        let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
        let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
        Some((r, g, b))
    };
    parse(color).unwrap_or((128, 128, 128))
}
