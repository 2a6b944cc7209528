use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One of the ten chemistry measurements reported by a water test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    FreeChlorine,
    TotalChlorine,
    Ph,
    Alkalinity,
    Calcium,
    CyanuricAcid,
    Iron,
    Copper,
    Phosphates,
    Salt,
}

impl Measurement {
    /// All measurements, in the column order of the results table.
    pub const ALL: [Measurement; 10] = [
        Self::FreeChlorine,
        Self::TotalChlorine,
        Self::Ph,
        Self::Alkalinity,
        Self::Calcium,
        Self::CyanuricAcid,
        Self::Iron,
        Self::Copper,
        Self::Phosphates,
        Self::Salt,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::FreeChlorine => "free_chlorine",
            Self::TotalChlorine => "total_chlorine",
            Self::Ph => "ph",
            Self::Alkalinity => "alkalinity",
            Self::Calcium => "calcium",
            Self::CyanuricAcid => "cyanuric_acid",
            Self::Iron => "iron",
            Self::Copper => "copper",
            Self::Phosphates => "phosphates",
            Self::Salt => "salt",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::FreeChlorine => "Leslies Free Chlorine",
            Self::TotalChlorine => "Leslies Total Chlorine",
            Self::Ph => "Leslies pH",
            Self::Alkalinity => "Leslies Total Alkalinity",
            Self::Calcium => "Leslies Calcium Hardness",
            Self::CyanuricAcid => "Leslies Cyanuric Acid",
            Self::Iron => "Leslies Iron",
            Self::Copper => "Leslies Copper",
            Self::Phosphates => "Leslies Phosphates",
            Self::Salt => "Leslies Salt",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Ph => "pH",
            Self::Phosphates => "ppb",
            _ => "ppm",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The most recent water test, as printed on the results page.
///
/// Values are kept verbatim (trimmed cell text) without numeric coercion.
/// A reading only exists when all ten measurements were extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterTestReading {
    pub free_chlorine: String,
    pub total_chlorine: String,
    pub ph: String,
    pub alkalinity: String,
    pub calcium: String,
    pub cyanuric_acid: String,
    pub iron: String,
    pub copper: String,
    pub phosphates: String,
    pub salt: String,
    /// `MM/DD/YYYY` as shown in the date badge.
    pub test_date: Option<String>,
    /// `false` only when the row is marked as not tested in store.
    pub in_store: bool,
}

impl WaterTestReading {
    pub fn get(&self, measurement: Measurement) -> &str {
        match measurement {
            Measurement::FreeChlorine => &self.free_chlorine,
            Measurement::TotalChlorine => &self.total_chlorine,
            Measurement::Ph => &self.ph,
            Measurement::Alkalinity => &self.alkalinity,
            Measurement::Calcium => &self.calcium,
            Measurement::CyanuricAcid => &self.cyanuric_acid,
            Measurement::Iron => &self.iron,
            Measurement::Copper => &self.copper,
            Measurement::Phosphates => &self.phosphates,
            Measurement::Salt => &self.salt,
        }
    }

    /// Flat `field -> value` mapping handed to the host.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::with_capacity(Measurement::ALL.len() + 2);
        for measurement in Measurement::ALL {
            fields.insert(
                measurement.key().to_owned(),
                Value::String(self.get(measurement).to_owned()),
            );
        }
        fields.insert(
            "test_date".to_owned(),
            self.test_date.clone().map_or(Value::Null, Value::String),
        );
        fields.insert("in_store".to_owned(), Value::Bool(self.in_store));
        fields
    }
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Freshly fetched and parsed.
    Fresh { reading: WaterTestReading },
    /// Served from the last-known-good cache after a failed parse.
    Cached {
        reading: WaterTestReading,
        fetched_at: DateTime<Utc>,
    },
    /// Nothing usable.
    Empty,
}

impl FetchOutcome {
    pub fn reading(&self) -> Option<&WaterTestReading> {
        match self {
            Self::Fresh { reading } | Self::Cached { reading, .. } => Some(reading),
            Self::Empty => None,
        }
    }

    pub fn into_reading(self) -> Option<WaterTestReading> {
        match self {
            Self::Fresh { reading } | Self::Cached { reading, .. } => Some(reading),
            Self::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    /// The flat mapping, empty when there is no reading.
    pub fn to_fields(&self) -> Map<String, Value> {
        self.reading()
            .map(WaterTestReading::to_fields)
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_reading() -> WaterTestReading {
        WaterTestReading {
            free_chlorine: "3.0".to_string(),
            total_chlorine: "3.2".to_string(),
            ph: "7.4".to_string(),
            alkalinity: "90".to_string(),
            calcium: "250".to_string(),
            cyanuric_acid: "50".to_string(),
            iron: "0".to_string(),
            copper: "0".to_string(),
            phosphates: "100".to_string(),
            salt: "3400".to_string(),
            test_date: Some("05/21/2025".to_string()),
            in_store: true,
        }
    }

    #[test]
    fn test_to_fields_contains_every_key() {
        let fields = sample_reading().to_fields();
        assert_eq!(fields.len(), 12);
        for measurement in Measurement::ALL {
            assert!(fields.contains_key(measurement.key()), "{measurement} missing");
        }
        assert_eq!(fields["ph"], Value::String("7.4".to_string()));
        assert_eq!(fields["test_date"], Value::String("05/21/2025".to_string()));
        assert_eq!(fields["in_store"], Value::Bool(true));
    }

    #[test]
    fn test_to_fields_matches_serde() {
        let reading = sample_reading();
        let via_serde = serde_json::to_value(&reading).unwrap();
        assert_eq!(via_serde, Value::Object(reading.to_fields()));
    }

    #[test]
    fn test_absent_test_date_is_null() {
        let mut reading = sample_reading();
        reading.test_date = None;
        assert_eq!(reading.to_fields()["test_date"], Value::Null);
    }

    #[test]
    fn test_outcome_accessors() {
        let fresh = FetchOutcome::Fresh {
            reading: sample_reading(),
        };
        assert!(!fresh.is_empty());
        assert!(!fresh.is_cached());
        assert_eq!(fresh.reading().unwrap().salt, "3400");

        let cached = FetchOutcome::Cached {
            reading: sample_reading(),
            fetched_at: Utc::now(),
        };
        assert!(cached.is_cached());
        assert_eq!(cached.to_fields().len(), 12);

        assert!(FetchOutcome::Empty.is_empty());
        assert!(FetchOutcome::Empty.to_fields().is_empty());
        assert_eq!(FetchOutcome::Empty.into_reading(), None);
    }

    #[test]
    fn test_units() {
        assert_eq!(Measurement::Ph.unit(), "pH");
        assert_eq!(Measurement::Phosphates.unit(), "ppb");
        assert_eq!(Measurement::Salt.unit(), "ppm");
        assert_eq!(Measurement::CyanuricAcid.display_name(), "Leslies Cyanuric Acid");
    }
}
