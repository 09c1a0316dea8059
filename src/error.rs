use thiserror::Error;

/// Failures a single chat request can end in. Every variant is turned into an
/// `{"error": ...}` reply at the handler boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error(
        "Please ask in the form 'predict for <city> <station type> <category>' \
         (expected at least {expected} words, got {found})"
    )]
    MalformedQuery { expected: usize, found: usize },

    #[error("Unknown {field}: {value}")]
    UnknownCategory { field: &'static str, value: String },

    #[error("No data found for city: {0}")]
    UnknownCity(String),

    // detail goes to the log, never to the client
    #[error("Prediction failed, the model could not produce a value")]
    ModelError(String),
}

impl PipelineError {
    pub fn model(detail: impl Into<String>) -> Self {
        PipelineError::ModelError(detail.into())
    }
}
