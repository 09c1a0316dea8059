use anyhow::{anyhow, bail, Context, Result};
use gbdt::{decision_tree::Data, gradient_boost::GBDT};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{
    encoder::Vocabulary,
    error::PipelineError,
    types::{EncodedFeatureVector, FEATURE_ORDER},
};

/// Sidecar written next to the model file. Records what the model was fitted
/// on so a mismatched encoder is caught at startup instead of producing
/// silently wrong loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub feat_list: Vec<String>,
    pub in_dim: Option<usize>,
    #[serde(default)]
    pub algorithm: String,
    pub vocabulary: Vocabulary,
    pub addresses: Vec<String>,
    #[serde(default)]
    pub train_rows: usize,
    #[serde(default)]
    pub test_rows: usize,
}

impl ModelMeta {
    pub fn new(vocabulary: Vocabulary, addresses: Vec<String>) -> Self {
        Self {
            feat_list: FEATURE_ORDER.iter().map(|s| s.to_string()).collect(),
            in_dim: Some(FEATURE_ORDER.len()),
            algorithm: "gbdt".to_string(),
            vocabulary,
            addresses,
            train_rows: 0,
            test_rows: 0,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read meta at {}", path.display()))?;
        serde_json::from_str(&txt).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let txt = serde_json::to_string_pretty(self)?;
        fs::write(path, txt).with_context(|| format!("failed to write meta at {}", path.display()))
    }

    /// Feature order and width must match what the encoder produces.
    pub fn check_layout(&self) -> Result<()> {
        if self.feat_list.iter().map(String::as_str).ne(FEATURE_ORDER.iter().copied()) {
            bail!(
                "model feature order {:?} does not match encoder order {:?}",
                self.feat_list,
                FEATURE_ORDER
            );
        }
        if let Some(in_dim) = self.in_dim {
            if in_dim != FEATURE_ORDER.len() {
                bail!("meta.in_dim ({}) != {}", in_dim, FEATURE_ORDER.len());
            }
        }
        Ok(())
    }

    /// The live label tables must be the ones the model was trained with.
    pub fn check_vocabulary(&self, vocabulary: &Vocabulary, addresses: &[String]) -> Result<()> {
        if &self.vocabulary != vocabulary {
            bail!(
                "model was trained with vocabulary {:?}, service is configured with {:?}",
                self.vocabulary,
                vocabulary
            );
        }
        if self.addresses != addresses {
            bail!(
                "model was trained on {} addresses that differ from the {} in the loaded dataset",
                self.addresses.len(),
                addresses.len()
            );
        }
        Ok(())
    }
}

/// A fitted regressor with a fixed input width.
pub trait Regressor: Send + Sync {
    fn arity(&self) -> usize;
    fn predict(&self, features: &[f32]) -> Result<f32>;
}

pub struct GbdtRegressor {
    model: GBDT,
    // width the trees were fitted on, independent of meta.json
    feature_size: usize,
    pub meta: ModelMeta,
}

/// `conf.feature_size` from a file written by `GBDT::save_model`. gbdt keeps
/// its config private, so it is read from the JSON directly.
fn saved_feature_size(model_path: &Path) -> Result<usize> {
    let txt = fs::read_to_string(model_path)
        .with_context(|| format!("failed to read model {}", model_path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&txt)
        .with_context(|| format!("model {} is not gbdt JSON", model_path.display()))?;
    json.pointer("/conf/feature_size")
        .and_then(serde_json::Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| anyhow!("model {} has no conf.feature_size", model_path.display()))
}

impl GbdtRegressor {
    /// Wrap a model fitted in process on `feature_size` features.
    pub fn new(model: GBDT, feature_size: usize, meta: ModelMeta) -> Self {
        Self {
            model,
            feature_size,
            meta,
        }
    }

    pub fn load(model_path: impl AsRef<Path>, meta_path: impl AsRef<Path>) -> Result<Self> {
        let meta = ModelMeta::load(meta_path)?;
        meta.check_layout()?;

        let model_path = model_path.as_ref();
        let path_str = model_path
            .to_str()
            .ok_or_else(|| anyhow!("model path {} is not valid UTF-8", model_path.display()))?;
        // checked before any prediction: gbdt panics on a sample narrower than its trees
        let feature_size = saved_feature_size(model_path)?;
        if feature_size != FEATURE_ORDER.len() {
            bail!(
                "model {} was fitted on {} features, encoder produces {} ({:?})",
                model_path.display(),
                feature_size,
                FEATURE_ORDER.len(),
                FEATURE_ORDER
            );
        }
        // gbdt reports errors as Box<dyn Error>, which is not Send + Sync
        let model = GBDT::load_model(path_str)
            .map_err(|e| anyhow!("failed to load model {}: {}", model_path.display(), e))?;

        let regressor = Self::new(model, feature_size, meta);
        // probe once so a broken artifact fails at load, not on the first request
        let probe = regressor.predict(&vec![0.0; FEATURE_ORDER.len()])?;
        tracing::info!(
            "loaded {} model from {}; feat_list: {:?}; probe={:.3}",
            regressor.meta.algorithm,
            model_path.display(),
            regressor.meta.feat_list,
            probe
        );
        Ok(regressor)
    }

    pub fn save(&self, model_path: impl AsRef<Path>, meta_path: impl AsRef<Path>) -> Result<()> {
        let model_path = model_path.as_ref();
        let path_str = model_path
            .to_str()
            .ok_or_else(|| anyhow!("model path {} is not valid UTF-8", model_path.display()))?;
        self.model
            .save_model(path_str)
            .map_err(|e| anyhow!("failed to save model {}: {}", model_path.display(), e))?;
        self.meta.save(meta_path)
    }
}

impl Regressor for GbdtRegressor {
    fn arity(&self) -> usize {
        self.feature_size
    }

    fn predict(&self, x: &[f32]) -> Result<f32> {
        if x.len() != self.arity() {
            bail!(
                "feature length mismatch: got {}, expected {}",
                x.len(),
                self.arity()
            );
        }
        let out = self.model.predict(&vec![Data::new_test_data(x.to_vec(), None)]);
        out.first()
            .copied()
            .ok_or_else(|| anyhow!("model returned no prediction"))
    }
}

/// Read-only wrapper around the regressor; shared by every request.
pub struct PredictionService {
    regressor: Box<dyn Regressor>,
}

impl PredictionService {
    /// Fails when the regressor's width differs from the encoder's feature
    /// order. That is a deployment defect and must stop startup.
    pub fn new(regressor: Box<dyn Regressor>) -> Result<Self> {
        if regressor.arity() != FEATURE_ORDER.len() {
            bail!(
                "model expects {} features, encoder produces {} ({:?})",
                regressor.arity(),
                FEATURE_ORDER.len(),
                FEATURE_ORDER
            );
        }
        Ok(Self { regressor })
    }

    pub fn predict(&self, vector: &EncodedFeatureVector) -> Result<f64, PipelineError> {
        let raw = self
            .regressor
            .predict(&vector.to_features())
            .map_err(|e| PipelineError::model(format!("{:#}", e)))?;
        if !raw.is_finite() {
            return Err(PipelineError::model(format!(
                "non-finite output {} for {:?}",
                raw, vector
            )));
        }
        Ok(f64::from(raw).max(0.0))
    }
}
