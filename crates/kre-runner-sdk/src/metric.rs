//! Metric submission types
//!
//! Worker modules describe a metric with [`SaveMetric`] and hand it to
//! [`Context::save_metric`](crate::Context::save_metric). Every field is
//! optional; the host fills in the date when the module leaves it out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds a metric can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricError {
    /// The input lacked values needed to make a prediction
    MissingValues,
    /// The input carried labels the model was never trained on
    NewLabels,
}

/// Named constant for [`MetricError::MissingValues`]
pub const ERR_MISSING_VALUES: MetricError = MetricError::MissingValues;

/// Named constant for [`MetricError::NewLabels`]
pub const ERR_NEW_LABELS: MetricError = MetricError::NewLabels;

impl MetricError {
    /// Every error kind the host accepts
    pub const ALL: [MetricError; 2] = [MetricError::MissingValues, MetricError::NewLabels];

    /// Wire name of the error kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricError::MissingValues => "missing_values",
            MetricError::NewLabels => "new_labels",
        }
    }
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricError {
    type Err = MetricParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricError::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| MetricParseError::UnknownErrorKind(s.to_string()))
    }
}

/// Errors raised while building a [`SaveMetric`] from text
#[derive(Error, Debug, PartialEq)]
pub enum MetricParseError {
    #[error("Invalid metric date {input:?}: {reason}")]
    InvalidDate { input: String, reason: String },

    #[error("Unknown metric error kind: {0}")]
    UnknownErrorKind(String),
}

/// Options for a single `save_metric` call.
///
/// | Field | Default when unset |
/// |-------|--------------------|
/// | `date` | host stamps the time of the `save_metric` call |
/// | `predicted_value` | stored as null |
/// | `true_value` | stored as null |
/// | `error` | stored as null |
///
/// # Example
/// ```
/// use kre_runner_sdk::metric::{SaveMetric, ERR_MISSING_VALUES};
///
/// let metric = SaveMetric::new()
///     .predicted_value("class_x")
///     .true_value("class_y");
/// assert!(metric.date.is_none());
///
/// let failed = SaveMetric::new().error(ERR_MISSING_VALUES);
/// assert_eq!(failed.error, Some(ERR_MISSING_VALUES));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveMetric {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub predicted_value: Option<String>,

    #[serde(default)]
    pub true_value: Option<String>,

    #[serde(default)]
    pub error: Option<MetricError>,
}

impl SaveMetric {
    /// Create an empty metric, every field left to its default
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the date from an RFC 3339 timestamp such as `2020-04-06T09:02:09.277853Z`
    pub fn date_rfc3339(mut self, date: &str) -> Result<Self, MetricParseError> {
        let parsed = DateTime::parse_from_rfc3339(date).map_err(|e| MetricParseError::InvalidDate {
            input: date.to_string(),
            reason: e.to_string(),
        })?;
        self.date = Some(parsed.with_timezone(&Utc));
        Ok(self)
    }

    pub fn predicted_value(mut self, value: impl Into<String>) -> Self {
        self.predicted_value = Some(value.into());
        self
    }

    pub fn true_value(mut self, value: impl Into<String>) -> Self {
        self.true_value = Some(value.into());
        self
    }

    pub fn error(mut self, error: MetricError) -> Self {
        self.error = Some(error);
        self
    }

    /// Resolve the date, falling back to `now` when unset
    pub fn date_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.date.unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ERR_MISSING_VALUES.as_str(), "missing_values");
        assert_eq!(ERR_NEW_LABELS.to_string(), "new_labels");
        assert_eq!(serde_json::to_value(ERR_NEW_LABELS).unwrap(), "new_labels");
        assert_eq!("missing_values".parse::<MetricError>().unwrap(), ERR_MISSING_VALUES);
        assert_eq!(
            "drift".parse::<MetricError>(),
            Err(MetricParseError::UnknownErrorKind("drift".to_string()))
        );
    }

    #[test]
    fn test_date_rfc3339() {
        let metric = SaveMetric::new().date_rfc3339("2020-04-07T00:00:00.0Z").unwrap();
        assert_eq!(metric.date, Some(Utc.with_ymd_and_hms(2020, 4, 7, 0, 0, 0).unwrap()));

        let metric = SaveMetric::new().date_rfc3339("2020-04-06T09:02:09.277853Z").unwrap();
        assert_eq!(metric.date.unwrap().timestamp_subsec_micros(), 277853);

        assert!(SaveMetric::new().date_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_date_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(SaveMetric::new().date_or(now), now);

        let fixed = Utc.with_ymd_and_hms(2020, 4, 7, 0, 0, 0).unwrap();
        assert_eq!(SaveMetric::new().date(fixed).date_or(now), fixed);
    }

    #[test]
    fn test_partial_fields_deserialize() {
        let metric: SaveMetric = serde_json::from_str(r#"{"error": "new_labels"}"#).unwrap();
        assert_eq!(metric.error, Some(ERR_NEW_LABELS));
        assert!(metric.date.is_none());
        assert!(metric.predicted_value.is_none());
        assert!(metric.true_value.is_none());
    }
}
