//! Measurement types submitted to the ingestion API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single time-series reading
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use measurement_loader::measurement::Measurement;
/// use uuid::Uuid;
///
/// let m = Measurement {
///     series_id: Uuid::nil(),
///     time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
///     value: 1.5,
/// };
/// let json = serde_json::to_string(&m).unwrap();
/// assert_eq!(
///     json,
///     r#"{"seriesId":"00000000-0000-0000-0000-000000000000","time":"2024-01-01T00:00:00Z","value":1.5}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub series_id: Uuid,
    pub time: DateTime<Utc>,
    pub value: f32,
}

/// All measurements for one series found in one file
///
/// Items keep the order in which their rows appeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementCollection {
    pub series_id: Uuid,
    pub items: Vec<Measurement>,
}

impl MeasurementCollection {
    pub fn new(series_id: Uuid) -> Self {
        Self {
            series_id,
            items: Vec::new(),
        }
    }

    /// Append a reading for this collection's series
    pub fn push(&mut self, time: DateTime<Utc>, value: f32) {
        self.items.push(Measurement {
            series_id: self.series_id,
            time,
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
