//! Offline steps: encoding the raw station dataset and fitting the regressor.

use anyhow::{bail, Context, Result};
use gbdt::{
    config::Config,
    decision_tree::{Data, DataVec},
    gradient_boost::GBDT,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use std::io::Write;

use crate::{
    encoder::FeatureEncoder,
    model::{GbdtRegressor, ModelMeta},
    types::{EncodedFeatureVector, FEATURE_ORDER},
};

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub iterations: usize,
    pub max_depth: u32,
    pub shrinkage: f32,
    /// Fraction of rows held out for evaluation.
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            iterations: 100,
            max_depth: 4,
            shrinkage: 0.1,
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub skipped_rows: usize,
    pub rmse: Option<f64>,
    pub r2: Option<f64>,
}

/// Encoded rows with their observed loads. Rows whose labels the vocabulary
/// does not know are skipped and counted.
fn encoded_rows(encoder: &FeatureEncoder) -> (Vec<(EncodedFeatureVector, f64)>, usize) {
    let mut rows = Vec::with_capacity(encoder.stations().len());
    let mut skipped = 0;
    for (i, rec) in encoder.stations().records().iter().enumerate() {
        match encoder.encode_record(rec) {
            Ok(v) => rows.push((v, rec.charging_load_kw)),
            Err(e) => {
                skipped += 1;
                tracing::warn!("skipping row {}: {}", i + 2, e);
            }
        }
    }
    (rows, skipped)
}

fn to_data(rows: &[(EncodedFeatureVector, f64)]) -> DataVec {
    rows.iter()
        .map(|(v, y)| Data::new_training_data(v.to_features(), 1.0, *y as f32, None))
        .collect()
}

fn evaluate(model: &GBDT, rows: &[(EncodedFeatureVector, f64)]) -> Option<(f64, f64)> {
    if rows.is_empty() {
        return None;
    }
    let test: DataVec = rows
        .iter()
        .map(|(v, _)| Data::new_test_data(v.to_features(), None))
        .collect();
    let preds = model.predict(&test);
    let n = rows.len() as f64;
    let mean = rows.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for ((_, y), p) in rows.iter().zip(preds.iter()) {
        ss_res += (y - f64::from(*p)).powi(2);
        ss_tot += (y - mean).powi(2);
    }
    let rmse = (ss_res / n).sqrt();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    Some((rmse, r2))
}

/// Fit a squared-error GBDT on the encoder's station table. The returned
/// regressor's metadata carries the encoder's vocabulary and addresses.
pub fn train(encoder: &FeatureEncoder, opts: &TrainOptions) -> Result<(GbdtRegressor, TrainReport)> {
    let (mut rows, skipped) = encoded_rows(encoder);
    if rows.is_empty() {
        bail!("no trainable rows ({} skipped)", skipped);
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    rows.shuffle(&mut rng);
    // tiny datasets are fitted whole and not evaluated
    let n_test = if rows.len() >= 5 {
        ((rows.len() as f64) * opts.test_ratio).round() as usize
    } else {
        0
    };
    let (test_rows, train_rows) = rows.split_at(n_test);

    let mut cfg = Config::new();
    cfg.set_feature_size(FEATURE_ORDER.len());
    cfg.set_max_depth(opts.max_depth);
    cfg.set_iterations(opts.iterations);
    cfg.set_shrinkage(opts.shrinkage);
    cfg.set_loss("SquaredError");

    let mut model = GBDT::new(&cfg);
    let mut train_data = to_data(train_rows);
    model.fit(&mut train_data);

    let metrics = evaluate(&model, test_rows);
    let report = TrainReport {
        train_rows: train_rows.len(),
        test_rows: test_rows.len(),
        skipped_rows: skipped,
        rmse: metrics.map(|m| m.0),
        r2: metrics.map(|m| m.1),
    };
    match metrics {
        Some((rmse, r2)) => tracing::info!(
            "trained on {} rows, hold-out {} rows: rmse={:.3} kW r2={:.3}",
            report.train_rows,
            report.test_rows,
            rmse,
            r2
        ),
        None => tracing::info!("trained on {} rows, no hold-out", report.train_rows),
    }

    let mut meta = ModelMeta::new(
        encoder.vocabulary().clone(),
        encoder.stations().addresses().to_vec(),
    );
    meta.train_rows = report.train_rows;
    meta.test_rows = report.test_rows;
    Ok((GbdtRegressor::new(model, FEATURE_ORDER.len(), meta), report))
}

#[derive(Serialize)]
struct EncodedRow<'a> {
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "City Code")]
    city: u32,
    #[serde(rename = "Station Type")]
    station_type: u32,
    #[serde(rename = "Category")]
    category: u32,
    #[serde(rename = "Charging Load (kW)")]
    charging_load_kw: f64,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

/// Write the station table with codes in place of labels. Returns
/// (written, skipped).
pub fn export_encoded<W: Write>(encoder: &FeatureEncoder, out: W) -> Result<(usize, usize)> {
    let mut wtr = csv::Writer::from_writer(out);
    let (mut written, mut skipped) = (0, 0);
    for (i, rec) in encoder.stations().records().iter().enumerate() {
        let v = match encoder.encode_record(rec) {
            Ok(v) => v,
            Err(e) => {
                skipped += 1;
                tracing::warn!("skipping row {}: {}", i + 2, e);
                continue;
            }
        };
        wtr.serialize(EncodedRow {
            address: &rec.address,
            city: v.city,
            station_type: v.station_type,
            category: v.category,
            charging_load_kw: rec.charging_load_kw,
            timestamp: rec.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .context("failed to write encoded row")?;
        written += 1;
    }
    wtr.flush().context("failed to flush encoded dataset")?;
    Ok((written, skipped))
}
