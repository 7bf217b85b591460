//! JSON-lines wire format: detector observations in, attendance records out.

use chrono::{DateTime, Utc};
use rollcall_core::{Candidate, Landmark, LandmarkSet};
use serde::{Deserialize, Serialize};

/// One line of input.
///
/// ```json
/// {"stream": "gate-1", "timestamp_ms": 1718000000000, "landmarks": [[0.5, 0.4, -0.02], ...]}
/// {"stream": "gate-1", "landmarks": null}
/// {"reload": true}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub stream: Option<String>,
    /// Capture time; the daemon clock is used when absent.
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
    /// `None` when the detector found no face.
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
    /// Re-read the registry directory instead of observing.
    #[serde(default)]
    pub reload: bool,
}

impl Observation {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn detection(&self) -> Option<LandmarkSet> {
        self.landmarks.clone().map(LandmarkSet::new)
    }

    pub fn timestamp_ms_or_now(&self) -> u64 {
        self.timestamp_ms
            .unwrap_or_else(|| u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0))
    }
}

/// One accepted identification, written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Similarity score, rounded to 4 decimals.
    pub confidence: f32,
    pub stream: String,
}

impl AttendanceRecord {
    pub fn new(candidate: &Candidate, timestamp_ms: u64, stream: &str) -> Self {
        let timestamp = i64::try_from(timestamp_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: candidate.name.clone(),
            timestamp,
            confidence: (candidate.similarity * 10_000.0).round() / 10_000.0,
            stream: stream.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_face() {
        let obs = Observation::parse(
            r#"{"stream": "gate-1", "timestamp_ms": 1000, "landmarks": [[0.1, 0.2, 0.3]]}"#,
        )
        .unwrap();
        assert_eq!(obs.stream.as_deref(), Some("gate-1"));
        assert_eq!(obs.timestamp_ms_or_now(), 1000);
        assert_eq!(obs.detection().unwrap().len(), 1);
        assert!(!obs.reload);
    }

    #[test]
    fn test_parse_no_face_and_reload() {
        let obs = Observation::parse(r#"{"landmarks": null}"#).unwrap();
        assert!(obs.detection().is_none());
        assert!(obs.timestamp_ms_or_now() > 0);

        let reload = Observation::parse(r#"{"reload": true}"#).unwrap();
        assert!(reload.reload);
    }

    #[test]
    fn test_record_rounds_confidence() {
        let candidate = Candidate {
            name: "Aditya".into(),
            similarity: 0.987_654,
        };
        let record = AttendanceRecord::new(&candidate, 1_700_000_000_000, "gate-1");
        assert_eq!(record.name, "Aditya");
        assert!((record.confidence - 0.9877).abs() < 1e-6);
        assert_eq!(record.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(record.id.len(), 36);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Aditya");
        assert_eq!(json["stream"], "gate-1");
    }
}
