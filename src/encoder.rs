use crate::{
    dataset::{StationRecord, StationTable},
    error::PipelineError,
    types::EncodedFeatureVector,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Label → code tables the model was trained with. A label's code is its
/// position in the list; lookups ignore case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub station_types: Vec<String>,
    pub categories: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            station_types: vec!["AC".into(), "DC".into(), "HPC".into()],
            categories: vec!["Rewe".into(), "Netto".into(), "Penny".into()],
        }
    }
}

fn position(labels: &[String], value: &str) -> Option<u32> {
    let value = value.trim().to_lowercase();
    labels
        .iter()
        .position(|l| l.to_lowercase() == value)
        .map(|i| i as u32)
}

impl Vocabulary {
    pub fn station_type_code(&self, label: &str) -> Option<u32> {
        position(&self.station_types, label)
    }

    pub fn category_code(&self, label: &str) -> Option<u32> {
        position(&self.categories, label)
    }

    pub fn station_type_label(&self, code: u32) -> Option<&str> {
        self.station_types.get(code as usize).map(String::as_str)
    }

    pub fn category_label(&self, code: u32) -> Option<&str> {
        self.categories.get(code as usize).map(String::as_str)
    }
}

/// Resolves raw categorical strings to the codes the regressor was fitted on.
/// Used both for live queries and for encoding training rows.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    vocabulary: Vocabulary,
    stations: Arc<StationTable>,
}

/// An encoded query together with the address its city resolved to.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub vector: EncodedFeatureVector,
    pub address: String,
}

impl FeatureEncoder {
    pub fn new(vocabulary: Vocabulary, stations: Arc<StationTable>) -> Self {
        Self { vocabulary, stations }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn stations(&self) -> &StationTable {
        &self.stations
    }

    fn station_type(&self, label: &str) -> Result<u32, PipelineError> {
        self.vocabulary
            .station_type_code(label)
            .ok_or_else(|| PipelineError::UnknownCategory {
                field: "station type",
                value: label.to_string(),
            })
    }

    fn category(&self, label: &str) -> Result<u32, PipelineError> {
        self.vocabulary
            .category_code(label)
            .ok_or_else(|| PipelineError::UnknownCategory {
                field: "category",
                value: label.to_string(),
            })
    }

    /// Encode a live query. Labels are checked before the city so a bad label
    /// is reported even when the city is unknown too.
    pub fn encode(
        &self,
        station_type: &str,
        category: &str,
        city: &str,
    ) -> Result<Encoded, PipelineError> {
        let station_type = self.station_type(station_type)?;
        let category = self.category(category)?;

        let record = self
            .stations
            .find_city(city)
            .ok_or_else(|| PipelineError::UnknownCity(city.to_lowercase()))?;
        let city_code = self
            .stations
            .address_code(&record.address)
            .ok_or_else(|| PipelineError::UnknownCity(city.to_lowercase()))?;

        Ok(Encoded {
            vector: EncodedFeatureVector {
                station_type,
                category,
                city: city_code,
            },
            address: record.address.clone(),
        })
    }

    /// Encode a dataset row by its exact address.
    pub fn encode_record(&self, record: &StationRecord) -> Result<EncodedFeatureVector, PipelineError> {
        let station_type = self.station_type(&record.station_type)?;
        let category = self.category(&record.category)?;
        let city = self
            .stations
            .address_code(&record.address)
            .ok_or_else(|| PipelineError::UnknownCity(record.address.clone()))?;
        Ok(EncodedFeatureVector {
            station_type,
            category,
            city,
        })
    }
}
