//! Stateless HTTP launch handler
//!
//! - `POST /` - JSON `JobRequest` in, JSON `LaunchHandle` out. A body that is
//!   not a JSON object is a 400; any launch failure, validation included, is a
//!   500 carrying the error message.
//! - `GET /metrics` - Prometheus text format
//! - `GET /healthz` - liveness

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use crate::job::JobRequest;
use crate::launch::Launcher;
use crate::metrics::{self, HANDLER_REQUESTS_TOTAL};

/// Create the handler router around a shared launcher
pub fn create_router(launcher: Arc<Launcher>) -> Router {
    Router::new()
        .route("/", post(launch))
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(launcher)
}

async fn launch(State(launcher): State<Arc<Launcher>>, body: Bytes) -> Response {
    let request: JobRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed launch request");
            return respond(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"));
        }
    };

    match launcher.launch(&request).await {
        Ok(handle) => {
            HANDLER_REQUESTS_TOTAL
                .with_label_values(&[StatusCode::OK.as_str()])
                .inc();
            Json(handle).into_response()
        }
        Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn respond(status: StatusCode, message: String) -> Response {
    HANDLER_REQUESTS_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();
    (status, message).into_response()
}

async fn prometheus_metrics() -> Response {
    match metrics::gather_text() {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::error::ProvisioningError;
    use crate::job::Zone;
    use crate::launch::{LaunchHandle, Provisioner};
    use crate::metadata::BootstrapScript;
    use crate::vm::{InstanceSpec, InstanceSpecBuilder, LaunchPolicy};

    struct StubProvisioner {
        fail: bool,
    }

    #[async_trait]
    impl Provisioner for StubProvisioner {
        async fn create_instance(
            &self,
            _project_id: &str,
            _zone: &Zone,
            _spec: &InstanceSpec,
        ) -> Result<(), ProvisioningError> {
            if self.fail {
                Err(ProvisioningError::Rejected("ZONE_RESOURCE_POOL_EXHAUSTED".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn router(fail: bool) -> Router {
        let builder = InstanceSpecBuilder::new(
            LaunchPolicy::default(),
            BootstrapScript::for_agent_image("gcr.io/acme/runbatch-agent:test"),
        );
        let launcher = Launcher::new(builder, Arc::new(StubProvisioner { fail }));
        create_router(Arc::new(launcher))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const VALID: &str = r#"{"projectId":"acme","zone":"us-central1-a",
        "serviceAccount":"jobs@acme.iam.gserviceaccount.com","image":"busybox"}"#;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_launch_ok() {
        let response = router(false).oneshot(post_json(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let handle: LaunchHandle = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(handle.instance_name.starts_with("runbatch-"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let response = router(false).oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn test_validation_error_is_server_error() {
        let response = router(false)
            .oneshot(post_json(r#"{"projectId":"acme"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "zone is required");
    }

    #[tokio::test]
    async fn test_malformed_zone_is_server_error() {
        let body = VALID.replace("us-central1-a", "us-central1");
        let response = router(false).oneshot(post_json(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("us-central1"));
    }

    #[tokio::test]
    async fn test_provisioning_failure_is_server_error() {
        let response = router(true).oneshot(post_json(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response)
            .await
            .contains("ZONE_RESOURCE_POOL_EXHAUSTED"));
    }

    #[tokio::test]
    async fn test_healthz_and_metrics() {
        let response = router(false)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "ok");

        let app = router(false);
        app.clone().oneshot(post_json(VALID)).await.unwrap();
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .contains("runbatch_handler_requests_total"));
    }
}
