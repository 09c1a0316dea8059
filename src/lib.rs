//! Charging-load prediction for EV stations behind a small chat endpoint.
//!
//! A message like `predict for Berlin AC Rewe` is parsed positionally,
//! encoded against the station-type / category vocabularies and the station
//! table, and fed to a gradient-boosted regressor loaded at startup.

pub mod config;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod handler;
pub mod model;
pub mod parser;
pub mod server;
pub mod train;
pub mod types;

pub use error::PipelineError;
pub use handler::RequestHandler;
