use serde::{Deserialize, Serialize};

/// Authoritative model input order. The artifact's meta.json must list exactly
/// these names.
pub const FEATURE_ORDER: [&str; 3] = ["station_type", "category", "city"];

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    // absent message behaves like an empty one (falls through to the hint)
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ChatReply {
    Response { response: String },
    Error { error: String },
}

impl ChatReply {
    pub fn response(text: impl Into<String>) -> Self {
        ChatReply::Response { response: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ChatReply::Error { error: text.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ChatReply::Error { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            ChatReply::Response { response } => response,
            ChatReply::Error { error } => error,
        }
    }

    /// Numeric load embedded in a prediction reply (`... is 12.34 kW.`).
    pub fn load_kw(&self) -> Option<f64> {
        match self {
            ChatReply::Response { response } => parse_load_kw(response),
            ChatReply::Error { .. } => None,
        }
    }
}

/// Pulls the value out of the `<float> kW` suffix a prediction reply ends with.
pub fn parse_load_kw(text: &str) -> Option<f64> {
    let head = text.trim_end().trim_end_matches('.').strip_suffix("kW")?;
    head.trim_end()
        .rsplit(char::is_whitespace)
        .next()?
        .parse::<f64>()
        .ok()
}

/// The three positional fields of a `predict for <city> <type> <category>`
/// message, already case-folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub city: String,
    pub station_type: String,
    pub category: String,
}

/// One inbound chat message and, once parsed, its fields.
#[derive(Debug, Clone)]
pub struct ChatQuery {
    pub raw: String,
    pub normalized: String,
    pub parsed: Option<ParsedQuery>,
}

impl ChatQuery {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = raw.trim().to_lowercase();
        Self {
            raw,
            normalized,
            parsed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodedFeatureVector {
    pub station_type: u32,
    pub category: u32,
    pub city: u32,
}

impl EncodedFeatureVector {
    /// Features laid out in `FEATURE_ORDER`.
    pub fn to_features(&self) -> Vec<f32> {
        vec![
            self.station_type as f32,
            self.category as f32,
            self.city as f32,
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub city: String,
    pub address: String,
    pub station_type: String,
    pub category: String,
    pub features: EncodedFeatureVector,
    pub load_kw: f64,
}

impl PredictionResult {
    pub fn message(&self) -> String {
        format!(
            "Predicted charging load for {} ({}, {}) is {:.2} kW.",
            self.city, self.station_type, self.category, self.load_kw
        )
    }
}
