use crate::{error::PipelineError, types::ParsedQuery};

/// `predict <city> <station type> <category>`; "for" between the keyword and
/// the city is optional.
pub const MIN_PREDICT_TOKENS: usize = 4;

/// Positional extraction of the trailing three tokens of a prediction request.
/// Input is case-folded; nothing is guessed when tokens are missing.
pub fn parse_prediction(message: &str) -> Result<ParsedQuery, PipelineError> {
    let folded = message.to_lowercase();
    let tokens: Vec<&str> = folded.split_whitespace().collect();
    if tokens.len() < MIN_PREDICT_TOKENS {
        return Err(PipelineError::MalformedQuery {
            expected: MIN_PREDICT_TOKENS,
            found: tokens.len(),
        });
    }

    let n = tokens.len();
    Ok(ParsedQuery {
        city: tokens[n - 3].to_string(),
        station_type: tokens[n - 2].to_string(),
        category: tokens[n - 1].to_string(),
    })
}
