use chrono::{DateTime, Utc};

use crate::reading::WaterTestReading;

#[derive(Debug, Clone)]
struct CacheEntry {
    reading: WaterTestReading,
    fetched_at: DateTime<Utc>,
}

/// Single-slot store of the most recent successfully parsed reading.
///
/// Overwritten only after a full fetch and parse succeeded; read only on
/// the fallback paths of a failed fetch.
#[derive(Debug, Clone, Default)]
pub struct LastKnownGood {
    entry: Option<CacheEntry>,
}

impl LastKnownGood {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, reading: WaterTestReading) {
        self.store_at(reading, Utc::now());
    }

    pub fn store_at(&mut self, reading: WaterTestReading, fetched_at: DateTime<Utc>) {
        self.entry = Some(CacheEntry {
            reading,
            fetched_at,
        });
    }

    pub fn get(&self) -> Option<(&WaterTestReading, DateTime<Utc>)> {
        self.entry.as_ref().map(|e| (&e.reading, e.fetched_at))
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.fetched_at)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}
