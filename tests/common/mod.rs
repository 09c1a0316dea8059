#![allow(dead_code)]

use anyhow::Result;
use charge_predictor::{
    dataset::StationTable,
    encoder::{FeatureEncoder, Vocabulary},
    model::{PredictionService, Regressor},
    RequestHandler,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

pub const DATASET: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/stations.csv");

/// Regressor returning a fixed value and counting how often it was called.
pub struct CountingRegressor {
    pub value: f32,
    pub calls: Arc<AtomicUsize>,
}

impl Regressor for CountingRegressor {
    fn arity(&self) -> usize {
        3
    }

    fn predict(&self, features: &[f32]) -> Result<f32> {
        assert_eq!(features.len(), 3);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value)
    }
}

pub fn stations() -> Arc<StationTable> {
    Arc::new(StationTable::load(DATASET).expect("fixture dataset should load"))
}

pub fn encoder() -> FeatureEncoder {
    FeatureEncoder::new(Vocabulary::default(), stations())
}

/// Handler backed by a constant regressor, plus its call counter.
pub fn stub_handler(value: f32) -> (RequestHandler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let regressor = CountingRegressor {
        value,
        calls: calls.clone(),
    };
    let service = PredictionService::new(Box::new(regressor)).expect("arity matches");
    (RequestHandler::new(encoder(), service), calls)
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Distinct addresses as listed in a "locations" reply.
pub fn listed_locations(text: &str) -> Vec<String> {
    let mut v: Vec<String> = text
        .strip_prefix("Available locations: ")
        .unwrap_or("")
        .split("; ")
        .map(str::to_string)
        .collect();
    v.sort();
    v
}
