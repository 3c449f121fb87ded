//! Admission Webhook for OpAMPBridge
//!
//! Two hooks guard OpAMPBridge resources:
//! - Mutating: fills in defaults and answers with a JSON patch
//! - Validating: rejects bridges that could never connect to their server
//!
//! Both are thin envelopes over [`opamp_bridge`], where defaulting and
//! validation are plain functions composed into an [`AdmissionPipeline`].

pub mod handler;
pub mod opamp_bridge;

use std::sync::Arc;

use axum::{routing::post, Router};

pub use opamp_bridge::{
    default, validate_create, validate_delete, validate_port_name, validate_port_number,
    validate_update, AdmissionPipeline, AdmissionStage,
};

/// Path of the mutating hook
pub const MUTATE_PATH: &str = "/mutate-opentelemetry-io-v1alpha1-opampbridge";

/// Path of the validating hook
pub const VALIDATE_PATH: &str = "/validate-opentelemetry-io-v1alpha1-opampbridge";

/// Shared state for webhook handlers
#[derive(Clone, Debug)]
pub struct WebhookState {
    /// Stages run by the mutating hook
    pub mutating: AdmissionPipeline,
    /// Stages run by the validating hook
    pub validating: AdmissionPipeline,
}

impl Default for WebhookState {
    fn default() -> Self {
        Self {
            mutating: AdmissionPipeline::mutating(),
            validating: AdmissionPipeline::default(),
        }
    }
}

/// Create the webhook router with both admission endpoints
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(handler::mutate_handler))
        .route(VALIDATE_PATH, post(handler::validate_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn review(endpoint: &str) -> serde_json::Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "e911857d-c318-11e8-bbad-025000000001",
                "kind": {"group": "opentelemetry.io", "version": "v1alpha1", "kind": "OpAMPBridge"},
                "resource": {"group": "opentelemetry.io", "version": "v1alpha1", "resource": "opampbridges"},
                "name": "my-bridge",
                "namespace": "observability",
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": {
                    "apiVersion": "opentelemetry.io/v1alpha1",
                    "kind": "OpAMPBridge",
                    "metadata": {"name": "my-bridge", "namespace": "observability"},
                    "spec": {
                        "endpoint": endpoint,
                        "protocol": "wss",
                        "capabilities": {"ReportsHealth": true},
                        "ports": [{"name": "metrics", "port": 8888}]
                    }
                },
                "oldObject": null,
                "dryRun": false
            }
        })
    }

    async fn post_review(path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let router = webhook_router(Arc::new(WebhookState::default()));
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[test]
    fn test_default_state_pipelines() {
        let state = WebhookState::default();
        assert_eq!(state.mutating.stages(), &[AdmissionStage::Default]);
        assert_eq!(
            state.validating.stages(),
            &[AdmissionStage::Default, AdmissionStage::Validate]
        );
    }

    /// Integration test: the mutating hook answers with a JSON patch
    #[tokio::test]
    async fn integration_mutate_endpoint() {
        let (status, body) = post_review(MUTATE_PATH, review("ws://opamp:4320")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["uid"], "e911857d-c318-11e8-bbad-025000000001");
        assert_eq!(body["response"]["allowed"], true);
        assert_eq!(body["response"]["patchType"], "JSONPatch");
    }

    /// Integration test: the validating hook admits a complete bridge
    #[tokio::test]
    async fn integration_validate_endpoint_allows() {
        let (status, body) = post_review(VALIDATE_PATH, review("ws://opamp:4320")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], true);
    }

    /// Integration test: the validating hook denies a bridge without endpoint
    #[tokio::test]
    async fn integration_validate_endpoint_denies() {
        let (status, body) = post_review(VALIDATE_PATH, review(" ")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], false);
        assert!(body["response"].to_string().contains("endpoint"));
    }

    /// Integration test: a review without a request is answered as invalid
    #[tokio::test]
    async fn integration_review_without_request() {
        let (status, body) = post_review(
            VALIDATE_PATH,
            json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], false);
    }

    /// Integration test: unknown paths are not routed
    #[tokio::test]
    async fn integration_unknown_path() {
        let (status, _) = post_review("/mutate/deployments", review("ws://opamp:4320")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
