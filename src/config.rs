use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::encoder::Vocabulary;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub meta_path: PathBuf,
    pub vocabulary: Vocabulary,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            dataset_path: PathBuf::from("data/stations.csv"),
            model_path: PathBuf::from("charging_load_model.gbdt"),
            meta_path: PathBuf::from("charging_load_model.meta.json"),
            vocabulary: Vocabulary::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = fs::read_to_string(&path)
            .with_context(|| format!("config file not found: {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("invalid config JSON in {}", path.display()))
    }

    /// File (if given) first, then `BIND_ADDR`, `DATASET_PATH`, `MODEL_PATH`,
    /// `META_PATH` from the environment.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok(cfg.with_overrides(|k| std::env::var(k).ok()))
    }

    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = var("DATASET_PATH") {
            self.dataset_path = v.into();
        }
        if let Some(v) = var("MODEL_PATH") {
            self.model_path = v.into();
        }
        if let Some(v) = var("META_PATH") {
            self.meta_path = v.into();
        }
        self
    }
}
