use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CheckUrlResponse {
    pub url: String,
    pub status: String,
    pub prediction_code: i8,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub timestamp: String,
    pub version: String,
}
