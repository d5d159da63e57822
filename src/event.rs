//! Detection events handed to callers and subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// A successful wake-phrase detection. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub phrase: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

impl DetectionEvent {
    pub fn new(phrase: impl Into<String>, confidence: f64, metadata: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phrase: phrase.into(),
            confidence,
            timestamp: Utc::now(),
            metadata,
        }
    }
}
