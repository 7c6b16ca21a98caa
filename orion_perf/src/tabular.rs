//! Flat row encoding of per-configuration summaries.
//!
//! Each row reads `configuration,metric,value1,value2,...`. The format is meant
//! for display and for feeding the chart renderer, not for round-tripping:
//! values share the row delimiter, so a decoder has to assume the
//! `(configuration, metric, value*)` shape.

use itertools::Itertools;
use log::warn;

use crate::summary::MetricSummary;

pub const DELIMITER: &str = ",";

/// Placeholder written for runs in which a metric was not evaluated.
pub const ABSENT: &str = "None";

/// One decoded row. Values are kept as text; see [`parse_value`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub configuration: String,
    pub metric: String,
    pub values: Vec<String>,
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => ABSENT.to_string(),
    }
}

pub fn serialize_summary(configuration: &str, summary: &MetricSummary) -> Vec<String> {
    summary
        .iter()
        .map(|(metric, series)| {
            std::iter::once(configuration.to_string())
                .chain(std::iter::once(metric.to_string()))
                .chain(series.value.iter().copied().map(format_value))
                .join(DELIMITER)
        })
        .collect()
}

/// Encode a batch of `(configuration, summary)` pairs, one line per metric.
/// Configurations without metrics produce no lines.
pub fn to_rows(batch: &[(String, MetricSummary)]) -> String {
    batch
        .iter()
        .filter(|(_, summary)| !summary.is_empty())
        .flat_map(|(configuration, summary)| serialize_summary(configuration, summary))
        .join("\n")
}

fn deserialize_row(line: &str) -> Option<Row> {
    let components = line.split(DELIMITER).collect_vec();

    let num_components = components.len();
    if num_components < 3 {
        warn!("Too few items with {num_components}, skipping row '{line}'");
        return None;
    }

    Some(Row {
        configuration: components[0].to_string(),
        metric: components[1].to_string(),
        values: components[2..].iter().map(|v| v.to_string()).collect(),
    })
}

/// Decode rows produced by [`to_rows`]. Blank lines are ignored, lines with
/// fewer than three fields are discarded with a warning.
pub fn from_rows(text: &str) -> Vec<Row> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(deserialize_row)
        .collect()
}

/// Interpret a cell as a number; the absent placeholder (any case) and
/// unparsable cells yield `None`.
pub fn parse_value(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.eq_ignore_ascii_case(ABSENT) {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        Ok(_) => None,
        Err(err) => {
            warn!("Cannot parse value '{cell}': {err}, skipping value");
            None
        }
    }
}
