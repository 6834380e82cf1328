use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{validation_error, AppError},
    features::FeatureExtractor,
    model::Classifier,
    types::{CheckUrlResponse, HealthResponse},
};

pub const LIVENESS_MESSAGE: &str = "Phishing URL analysis API is running";

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<FeatureExtractor>,
    /// `None` when the model artifact could not be loaded at startup.
    pub classifier: Option<Arc<dyn Classifier>>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/check_url", post(check_url))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn home() -> &'static str {
    LIVENESS_MESSAGE
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.classifier.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn check_url(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CheckUrlResponse>, AppError> {
    let start = Instant::now();
    metrics::counter!("check_url_requests_total").increment(1);

    let classifier = state.classifier.as_ref().ok_or(AppError::ModelUnavailable)?;
    let Json(body) = body.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let url = requested_url(&body)?;

    let request_id = Uuid::new_v4();
    info!(%request_id, "Analyzing URL: {}", url);

    let features = state.extractor.extract(&url).await;
    debug!(%request_id, "Features: {}", serde_json::to_string(&features).unwrap_or_default());

    let classifier = Arc::clone(classifier);
    let prediction = tokio::task::spawn_blocking(move || classifier.predict(&features))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    info!(%request_id, "Prediction: {} (code: {})", prediction.status(), prediction.code());

    metrics::counter!("check_url_verdicts_total", "status" => prediction.status()).increment(1);
    metrics::histogram!("check_url_duration_ms").record(start.elapsed().as_secs_f64() * 1000.0);

    Ok(Json(CheckUrlResponse {
        url,
        status: prediction.status().to_string(),
        prediction_code: prediction.code(),
    }))
}

fn requested_url(body: &Value) -> Result<String, AppError> {
    match body.get("url") {
        Some(Value::String(url)) => Ok(url.clone()),
        Some(_) => Err(validation_error("\"url\" must be a string")),
        None => Err(validation_error("\"url\" not found in JSON body")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        features::FeatureVector,
        lookup::{
            stubs::{StubDns, StubRegistration},
            LookupError,
        },
        model::{tests::stump_artifact, ForestModel, ModelError, Prediction},
    };
    use axum::{body::Body, http::Request};
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Returns a fixed verdict and remembers the vectors it was asked about.
    struct StubClassifier {
        verdict: Result<Prediction, String>,
        seen: Mutex<Vec<FeatureVector>>,
    }

    impl StubClassifier {
        fn new(verdict: Result<Prediction, String>) -> Arc<Self> {
            Arc::new(Self { verdict, seen: Mutex::new(Vec::new()) })
        }
    }

    impl Classifier for StubClassifier {
        fn predict(&self, features: &FeatureVector) -> Result<Prediction, ModelError> {
            self.seen.lock().unwrap().push(*features);
            self.verdict.clone().map_err(ModelError::Predict)
        }
    }

    fn state(classifier: Option<Arc<dyn Classifier>>) -> AppState {
        let extractor = FeatureExtractor::new(
            Arc::new(StubRegistration(Err(LookupError::Timeout))),
            Arc::new(StubDns(Ok(()))),
        );
        AppState {
            extractor: Arc::new(extractor),
            classifier,
            metrics: None,
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/check_url")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_home_is_plain_text() {
        let app = router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], LIVENESS_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_safe_verdict() {
        let app = router(state(Some(StubClassifier::new(Ok(Prediction::Legitimate)))));
        let (status, body) = send(app, post_json(r#"{"url": "https://www.example.com"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"url": "https://www.example.com", "status": "an_toan", "prediction_code": 1})
        );
    }

    #[tokio::test]
    async fn test_phishing_verdict() {
        let app = router(state(Some(StubClassifier::new(Ok(Prediction::Phishing)))));
        let (status, body) = send(app, post_json(r#"{"url": "http://198.51.100.7/login"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "phishing");
        assert_eq!(body["prediction_code"], -1);
    }

    #[tokio::test]
    async fn test_classifier_sees_extracted_vector() {
        let classifier = StubClassifier::new(Ok(Prediction::Legitimate));
        let app = router(state(Some(classifier.clone())));
        send(app, post_json(r#"{"url": "https://www.example.com"}"#)).await;

        let seen = classifier.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("SSLfinal_State"), Some(1));
        assert_eq!(seen[0].get("DNSRecord"), Some(1));
        assert_eq!(seen[0].get("age_of_domain"), Some(-1));
    }

    #[tokio::test]
    async fn test_unparseable_url_is_still_classified() {
        let classifier = StubClassifier::new(Ok(Prediction::Phishing));
        let app = router(state(Some(classifier.clone())));
        let (status, body) = send(app, post_json(r#"{"url": ""}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "");
        assert_eq!(classifier.seen.lock().unwrap()[0], FeatureVector::zeroed());
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let app = router(state(Some(StubClassifier::new(Ok(Prediction::Legitimate)))));
        let (status, body) = send(app, post_json("{}")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        for raw in [r#"{"url": 42}"#, "not json", "[1, 2]"] {
            let app = router(state(Some(StubClassifier::new(Ok(Prediction::Legitimate)))));
            let (status, body) = send(app, post_json(raw)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", raw);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_missing_model_is_server_error() {
        let app = router(state(None));
        let (status, body) = send(app, post_json(r#"{"url": "https://www.example.com"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "model is not loaded, check server logs");
    }

    #[tokio::test]
    async fn test_prediction_failure_surfaces_message() {
        let app = router(state(Some(StubClassifier::new(Err("tree exploded".to_string())))));
        let (status, body) = send(app, post_json(r#"{"url": "https://www.example.com"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("tree exploded"));
    }

    struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn predict(&self, _features: &FeatureVector) -> Result<Prediction, ModelError> {
            panic!("corrupt model state");
        }
    }

    #[tokio::test]
    async fn test_classifier_panic_is_server_error() {
        let app = router(state(Some(Arc::new(PanickingClassifier))));
        let (status, body) = send(app, post_json(r#"{"url": "https://www.example.com"}"#)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("internal server error"));
    }

    #[tokio::test]
    async fn test_forest_model_end_to_end() {
        let model = ForestModel::from_artifact(stump_artifact()).unwrap();
        let app = router(state(Some(Arc::new(model))));

        let (_, body) = send(app.clone(), post_json(r#"{"url": "https://www.example.com"}"#)).await;
        assert_eq!(body["status"], "an_toan");

        let (_, body) = send(app, post_json(r#"{"url": "http://www.example.com"}"#)).await;
        assert_eq!(body["status"], "phishing");
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        let app = router(state(None));
        let (status, body) = send(app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = router(state(None));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
