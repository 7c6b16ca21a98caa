//! Extraction of regressions from orion changepoint records.
//!
//! Orion marks runs that start a new regime with `is_changepoint` and reports
//! the relative change of every metric at that point. Attribution compares a
//! changepoint with the run right before it: the pull requests that appear
//! only in the changepoint run are the candidates that introduced the change.

use std::fmt::Display;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum RegressionError {
    #[error("Error : {0}")]
    Json(#[from] serde_json::Error),
}

/// One element of orion's output array.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChangepointRecord {
    #[serde(default)]
    pub is_changepoint: bool,

    #[serde(default, rename = "ocpVersion", alias = "version")]
    pub version: Option<String>,

    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default, deserialize_with = "deserialize_prs")]
    pub prs: Vec<String>,

    #[serde(default)]
    pub metrics: Map<String, Value>,
}

fn deserialize_prs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let prs: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(prs
        .unwrap_or_default()
        .into_iter()
        .map(|pr| match pr {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

impl ChangepointRecord {
    /// Signed percentage change per metric, in output order. Metrics without
    /// a numeric `percentage_change` are left out.
    pub fn percentage_changes(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().filter_map(|(name, data)| {
            data.get("percentage_change")
                .and_then(Value::as_f64)
                .map(|change| (name.as_str(), change))
        })
    }

    /// Descriptions of the non-zero changes of this record.
    pub fn describe_changes(&self) -> Vec<String> {
        self.percentage_changes()
            .filter_map(|(metric, change)| describe_change(metric, change))
            .collect()
    }
}

fn describe_change(metric: &str, change: f64) -> Option<String> {
    if change > 0.0 {
        Some(format!("{metric} increased by {}%", two_decimals(change)))
    } else if change < 0.0 {
        Some(format!("{metric} decreased by {}%", two_decimals(change.abs())))
    } else {
        None
    }
}

/// Cut the shortest decimal representation of `value` to two decimals
/// without rounding, so 12.345 reads as 12.34.
fn two_decimals(value: f64) -> String {
    let text = value.to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let fraction: String = fraction.chars().chain("00".chars()).take(2).collect();
    format!("{whole}.{fraction}")
}

/// A changepoint together with what changed since the previous run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionDetail {
    pub uuid: Option<String>,
    pub version: Option<String>,
    pub previous_version: Option<String>,
    /// Pull requests present at the changepoint but not in the previous run.
    pub new_prs: Vec<String>,
    pub changes: Vec<String>,
}

impl Display for RegressionDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Changepoint at version {} (uuid {})",
            self.version.as_deref().unwrap_or("unknown"),
            self.uuid.as_deref().unwrap_or("unknown"),
        )?;
        if let Some(previous) = &self.previous_version {
            write!(f, ", previous version {previous}")?;
        }
        if !self.new_prs.is_empty() {
            write!(f, "\n  New PRs: {}", self.new_prs.iter().join(", "))?;
        }
        for change in &self.changes {
            write!(f, "\n  {change}")?;
        }
        Ok(())
    }
}

pub fn parse_records(stdout: &str) -> Result<Vec<ChangepointRecord>, RegressionError> {
    Ok(serde_json::from_str(stdout)?)
}

/// Describe every non-zero metric change of every changepoint, in order.
pub fn extract_metric_descriptions(stdout: &str) -> Result<Vec<String>, RegressionError> {
    Ok(metric_descriptions(&parse_records(stdout)?))
}

pub fn metric_descriptions(records: &[ChangepointRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.is_changepoint)
        .flat_map(ChangepointRecord::describe_changes)
        .collect()
}

/// Detail every changepoint with its attribution to the previous run.
pub fn extract_details(stdout: &str) -> Result<Vec<RegressionDetail>, RegressionError> {
    Ok(details(&parse_records(stdout)?))
}

pub fn details(records: &[ChangepointRecord]) -> Vec<RegressionDetail> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.is_changepoint)
        .map(|(index, record)| {
            let previous = index.checked_sub(1).map(|i| &records[i]);
            let new_prs = match previous {
                Some(previous) => record
                    .prs
                    .iter()
                    .filter(|pr| !previous.prs.contains(pr))
                    .cloned()
                    .collect(),
                None => record.prs.clone(),
            };
            RegressionDetail {
                uuid: record.uuid.clone(),
                version: record.version.clone(),
                previous_version: previous.and_then(|p| p.version.clone()),
                new_prs,
                changes: record.describe_changes(),
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn describes_positive_change() {
        let descriptions = extract_metric_descriptions(
            r#"[{"is_changepoint": true, "metrics": {"cpu": {"percentage_change": 12.345}}}]"#,
        )
        .unwrap();
        assert_eq!(descriptions, vec!["cpu increased by 12.34%"]);
    }

    #[test]
    fn describes_negative_and_skips_zero() {
        let descriptions = extract_metric_descriptions(
            r#"[
                {"is_changepoint": false, "metrics": {"cpu": {"percentage_change": 50}}},
                {"is_changepoint": true, "metrics": {
                    "lat": {"percentage_change": -7.5},
                    "mem": {"percentage_change": 0},
                    "disk": {"value": 3}
                }}
            ]"#,
        )
        .unwrap();
        assert_eq!(descriptions, vec!["lat decreased by 7.50%"]);
    }

    #[test]
    fn changes_are_cut_not_rounded() {
        assert_eq!(two_decimals(12.345), "12.34");
        assert_eq!(two_decimals(0.29), "0.29");
        assert_eq!(two_decimals(7.5), "7.50");
        assert_eq!(two_decimals(15.0), "15.00");
        assert_eq!(two_decimals(0.999), "0.99");
        assert_eq!(
            describe_change("lat", -7.5),
            Some("lat decreased by 7.50%".to_string())
        );
        assert_eq!(
            describe_change("cpu", 0.29),
            Some("cpu increased by 0.29%".to_string())
        );
        assert_eq!(describe_change("cpu", 0.0), None);
    }

    #[test]
    fn tolerates_missing_fields() {
        let records = parse_records(r#"[{"is_changepoint": true, "metrics": {}}, {}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].prs.is_empty());
        assert!(metric_descriptions(&records).is_empty());

        let records = parse_records(r#"[{"is_changepoint": true, "prs": null}]"#).unwrap();
        assert!(records[0].prs.is_empty());
    }

    #[test]
    fn malformed_output_is_an_error() {
        let err = extract_metric_descriptions("orion crashed").unwrap_err();
        assert!(err.to_string().starts_with("Error : "));
        assert!(extract_details(r#"{"is_changepoint": true}"#).is_err());
    }

    #[test]
    fn details_attribute_new_prs() {
        let details = extract_details(
            r#"[
                {"is_changepoint": false, "ocpVersion": "4.19.0-0.nightly-1", "uuid": "a",
                 "prs": ["org/repo#1", "org/repo#2"], "metrics": {}},
                {"is_changepoint": true, "ocpVersion": "4.19.0-0.nightly-2", "uuid": "b",
                 "prs": ["org/repo#3", "org/repo#1", "org/repo#4"],
                 "metrics": {"podReadyLatency": {"percentage_change": 15}}}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            details,
            vec![RegressionDetail {
                uuid: Some("b".to_string()),
                version: Some("4.19.0-0.nightly-2".to_string()),
                previous_version: Some("4.19.0-0.nightly-1".to_string()),
                new_prs: vec!["org/repo#3".to_string(), "org/repo#4".to_string()],
                changes: vec!["podReadyLatency increased by 15.00%".to_string()],
            }]
        );
    }

    #[test]
    fn first_record_has_no_previous_version() {
        let details = extract_details(
            r#"[{"is_changepoint": true, "ocpVersion": "4.18", "prs": [101, 102], "metrics": {}}]"#,
        )
        .unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].previous_version, None);
        assert_eq!(details[0].new_prs, vec!["101", "102"]);
        assert!(details[0].changes.is_empty());
    }

    #[test]
    fn detail_display() {
        let detail = RegressionDetail {
            uuid: Some("b".to_string()),
            version: Some("4.19.1".to_string()),
            previous_version: Some("4.19.0".to_string()),
            new_prs: vec!["#3".to_string()],
            changes: vec!["cpu increased by 1.00%".to_string()],
        };
        assert_eq!(
            detail.to_string(),
            "Changepoint at version 4.19.1 (uuid b), previous version 4.19.0\n  New PRs: #3\n  cpu increased by 1.00%"
        );
    }
}
