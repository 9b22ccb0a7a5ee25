use serde::{Deserialize, Serialize};

/// Named numeric fields describing one frame, in analyzer-defined order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    fields: Vec<(String, f64)>,
}

impl MeasurementRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or overwrite a field, keeping first-insertion order
    pub fn set<S: Into<String>>(&mut self, name: S, value: f64) {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| *value)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// One entry of the session's measurement log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    Recorded(MeasurementRecord),
    /// Sentinel for a frame the analyzer failed on
    Missing { reason: String },
}

impl Measurement {
    pub fn record(&self) -> Option<&MeasurementRecord> {
        match self {
            Measurement::Recorded(record) => Some(record),
            Measurement::Missing { .. } => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Measurement::Missing { .. })
    }
}
