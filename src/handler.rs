use anyhow::{Context, Result};
use std::{fmt, sync::Arc};

use crate::{
    config::ServiceConfig,
    dataset::StationTable,
    encoder::FeatureEncoder,
    error::PipelineError,
    model::{GbdtRegressor, PredictionService},
    parser,
    types::{ChatQuery, ChatReply, PredictionResult},
};

/// Where a prediction request got to. `Responded` is only reached on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Encoded,
    Predicted,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Parsed => "parsed",
            Stage::Encoded => "encoded",
            Stage::Predicted => "predicted",
            Stage::Responded => "responded",
        };
        f.write_str(s)
    }
}

/// Terminal failure of a prediction request: the error and the last stage
/// that completed before it.
#[derive(Debug, Clone, PartialEq)]
pub struct Failed {
    pub stage: Stage,
    pub error: PipelineError,
}

type Respond = fn(&RequestHandler, &mut ChatQuery) -> Result<String, Failed>;

/// One keyword dispatch rule. Rules are tried in `RULES` order against the
/// case-folded message and the first match answers.
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
    respond: Respond,
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "predict",
        matches: |m| m.contains("predict"),
        respond: |h, q| h.predict(q).map(|p| p.message()),
    },
    Rule {
        name: "locations",
        matches: |m| m.contains("location"),
        respond: |h, _| Ok(h.list_locations()),
    },
    Rule {
        name: "station_types",
        matches: |m| m.contains("station type"),
        respond: |h, _| {
            Ok(format!(
                "Available station types: {}",
                h.encoder.vocabulary().station_types.join(", ")
            ))
        },
    },
    Rule {
        name: "categories",
        matches: |m| m.contains("categor"),
        respond: |h, _| {
            Ok(format!(
                "Available categories: {}",
                h.encoder.vocabulary().categories.join(", ")
            ))
        },
    },
];

pub const HINT: &str = "Ask me about locations, station types or categories, \
                        or request a prediction like 'predict for Berlin AC Rewe'!";

/// Turns chat messages into replies. Holds only read-only state, so one
/// instance serves every request.
pub struct RequestHandler {
    encoder: FeatureEncoder,
    service: PredictionService,
}

impl RequestHandler {
    pub fn new(encoder: FeatureEncoder, service: PredictionService) -> Self {
        Self { encoder, service }
    }

    /// Load dataset and model artifact per `cfg` and verify they belong together.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        let stations = Arc::new(StationTable::load(&cfg.dataset_path)?);
        let regressor = GbdtRegressor::load(&cfg.model_path, &cfg.meta_path)
            .context("failed to load model artifact")?;
        regressor
            .meta
            .check_vocabulary(&cfg.vocabulary, stations.addresses())
            .context("model artifact does not match the configured encoder")?;

        let encoder = FeatureEncoder::new(cfg.vocabulary.clone(), stations);
        let service = PredictionService::new(Box::new(regressor))?;
        Ok(Self::new(encoder, service))
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Handle one message. Never fails: every error becomes an error reply.
    pub fn handle(&self, message: &str) -> ChatReply {
        let mut query = ChatQuery::new(message);
        let Some(rule) = RULES.iter().find(|r| (r.matches)(&query.normalized)) else {
            return ChatReply::response(HINT);
        };
        tracing::debug!("rule {} matched {:?}", rule.name, query.raw);

        match (rule.respond)(self, &mut query) {
            Ok(text) => {
                tracing::debug!("stage {}: {}", Stage::Responded, text);
                ChatReply::response(text)
            }
            Err(Failed { stage, error }) => {
                match &error {
                    PipelineError::ModelError(detail) => {
                        tracing::error!("model error after stage {}: {}", stage, detail)
                    }
                    other => tracing::debug!("request failed after stage {}: {}", stage, other),
                }
                ChatReply::error(error.to_string())
            }
        }
    }

    /// parse → encode → predict for a single query.
    pub fn predict(&self, query: &mut ChatQuery) -> Result<PredictionResult, Failed> {
        let fail = |stage| move |error| Failed { stage, error };

        let parsed = parser::parse_prediction(&query.normalized).map_err(fail(Stage::Received))?;
        query.parsed = Some(parsed.clone());
        tracing::debug!("stage {}: {:?}", Stage::Parsed, parsed);

        let encoded = self
            .encoder
            .encode(&parsed.station_type, &parsed.category, &parsed.city)
            .map_err(fail(Stage::Parsed))?;
        tracing::debug!("stage {}: {:?}", Stage::Encoded, encoded.vector);

        let load_kw = self.service.predict(&encoded.vector).map_err(fail(Stage::Encoded))?;
        tracing::debug!("stage {}: {:.3} kW", Stage::Predicted, load_kw);

        let vocab = self.encoder.vocabulary();
        let result = PredictionResult {
            city: parsed.city,
            address: encoded.address,
            station_type: vocab
                .station_type_label(encoded.vector.station_type)
                .unwrap_or(&parsed.station_type)
                .to_string(),
            category: vocab
                .category_label(encoded.vector.category)
                .unwrap_or(&parsed.category)
                .to_string(),
            features: encoded.vector,
            load_kw,
        };
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&result) {
                Ok(json) => tracing::debug!("prediction {}", json),
                Err(e) => tracing::debug!("prediction not serializable: {}", e),
            }
        }
        Ok(result)
    }

    /// Distinct addresses in dataset order, joined with `"; "` rather than
    /// `", "` because the addresses themselves contain commas.
    fn list_locations(&self) -> String {
        format!(
            "Available locations: {}",
            self.encoder.stations().locations().join("; ")
        )
    }
}
