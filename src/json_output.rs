//! JSON bodies returned by the HTTP endpoints

use serde::Serialize;
use serde_json::Value;

use crate::counts::CountsMap;
use crate::service::{CountOutcome, HealthReport};

/// `200` body of `POST /api/contar`
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub ok: bool,
    pub counts: CountsMap,
    pub model: String,
    pub raw_debug: Value,
    pub geometry_fallback: bool,
    pub parse_degraded: bool,
}

impl From<CountOutcome> for CountResponse {
    fn from(outcome: CountOutcome) -> Self {
        Self {
            ok: true,
            counts: outcome.counts,
            model: outcome.model,
            raw_debug: outcome.raw_debug,
            geometry_fallback: outcome.geometry_fallback,
            parse_degraded: outcome.parse_degraded,
        }
    }
}

/// Body of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}

/// Body of `GET /api/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub available_models: Vec<String>,
    pub model: String,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: "online",
            available_models: report.available_models,
            model: report.model,
        }
    }
}
