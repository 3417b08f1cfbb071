//! HTTP router.
//!
//! Layers (outermost first): CORS -> request tracing -> body limit -> handler.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the detection service router.
pub fn detection_router(ctx: ApiContext, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(endpoints::health::check))
        .route("/api/hello", get(endpoints::health::hello))
        .route("/api/model", get(endpoints::health::model))
        .route("/detect", post(endpoints::detect::detect))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::pipeline::model::ModelSlot;

    const LIMIT: usize = 10 * 1024 * 1024;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/detect")
            .header(header::CONTENT_TYPE, content_type())
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_reports_service() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) = send(app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "healthy", "service": "door-detection"}));
    }

    #[tokio::test]
    async fn hello_returns_banner() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) = send(app, get("/api/hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Door Plan Detection API");
    }

    #[tokio::test]
    async fn model_status_reports_missing_weights() {
        let slot = ModelSlot::unavailable(PathBuf::from("/opt/doorplan/best.onnx"));
        let app = detection_router(ctx_with(slot), LIMIT);
        let (status, json) = send(app, get("/api/model")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["available"], false);
        assert_eq!(json["model_file"], "best.onnx");
        assert!(!json.to_string().contains("/opt/doorplan"));
    }

    #[tokio::test]
    async fn model_status_reports_loaded_detector() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (_, json) = send(app, get("/api/model")).await;
        assert_eq!(json["available"], true);
    }

    #[tokio::test]
    async fn detect_returns_door_boxes_only() {
        let png = plan_png(100, 100);
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) =
            send(app, post_multipart(&[("files", Some("plan.png"), &png[..])])).await;

        assert_eq!(status, StatusCode::OK);
        let images = json["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["filename"], "plan.png");
        assert_eq!(images[0]["status"], "detected");
        assert_eq!(
            images[0]["boxes"],
            serde_json::json!([{
                "x": 10, "y": 10, "width": 40, "height": 50,
                "className": "Door", "confidence": 0.9
            }])
        );
        assert!(images[0]["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
        let original = images[0]["original_image"].as_str().unwrap();
        assert!(original.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn detect_pdf_uses_first_rendered_page() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) =
            send(app, post_multipart(&[("files", Some("PLAN.PDF"), &b"%PDF-1.7 stub"[..])])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["images"][0]["filename"], "PLAN.PDF");
        assert_eq!(json["images"][0]["boxes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_file_does_not_fail_request() {
        let png = plan_png(100, 100);
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) = send(
            app,
            post_multipart(&[
                ("files", Some("broken.jpg"), &b"not an image"[..]),
                ("files", Some("plan.png"), &png[..]),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let images = json["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0]["filename"], "broken.jpg");
        assert_eq!(images[0]["error"]["code"], "INPUT_DECODE");
        assert_eq!(images[0]["error"]["status"], 422);
        assert_eq!(images[1]["filename"], "plan.png");
        assert_eq!(images[1]["boxes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn results_follow_upload_order() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let small = plan_png(60, 60);
        let large = plan_png(400, 300);
        let names = ["c.png", "a.png", "b.png"];
        let (_, json) = send(
            app,
            post_multipart(&[
                ("files", Some(names[0]), &large[..]),
                ("files", Some(names[1]), &small[..]),
                ("files", Some(names[2]), &large[..]),
            ]),
        )
        .await;
        let returned: Vec<&str> = json["images"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["filename"].as_str().unwrap())
            .collect();
        assert_eq!(returned, names);
    }

    #[tokio::test]
    async fn one_file_at_a_time_keeps_upload_order() {
        let ctx = ctx_with_doors().with_max_concurrent_files(1);
        assert_eq!(ctx.max_concurrent_files, 1);
        let app = detection_router(ctx, LIMIT);
        let small = plan_png(60, 60);
        let large = plan_png(400, 300);
        let (status, json) = send(
            app,
            post_multipart(&[
                ("files", Some("first.png"), &large[..]),
                ("files", Some("second.jpg"), &b"garbage"[..]),
                ("files", Some("third.png"), &small[..]),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let images = json["images"].as_array().unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0]["filename"], "first.png");
        assert_eq!(images[0]["status"], "detected");
        assert_eq!(images[1]["filename"], "second.jpg");
        assert_eq!(images[1]["error"]["code"], "INPUT_DECODE");
        assert_eq!(images[2]["filename"], "third.png");
        assert_eq!(images[2]["status"], "detected");
    }

    #[test]
    fn file_concurrency_is_at_least_one() {
        assert_eq!(ctx_with_doors().with_max_concurrent_files(0).max_concurrent_files, 1);
    }

    #[tokio::test]
    async fn single_file_field_and_missing_filename() {
        let png = plan_png(50, 50);
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) = send(app, post_multipart(&[("file", Some(""), &png[..])])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["images"][0]["filename"], "unknown");
    }

    #[tokio::test]
    async fn unavailable_detector_returns_preprocessed_image() {
        let png = plan_png(50, 50);
        let slot = ModelSlot::unavailable(PathBuf::from("missing.onnx"));
        let app = detection_router(ctx_with(slot), LIMIT);
        let (status, json) =
            send(app, post_multipart(&[("files", Some("plan.png"), &png[..])])).await;

        assert_eq!(status, StatusCode::OK);
        let image = &json["images"][0];
        assert_eq!(image["status"], "detector_unavailable");
        assert_eq!(image["boxes"], serde_json::json!([]));
        assert_eq!(image["image"], image["original_image"]);
    }

    #[tokio::test]
    async fn no_file_parts_is_400() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let (status, json) = send(app, post_multipart(&[("note", None, &b"hello"[..])])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "NO_FILES");
    }

    #[tokio::test]
    async fn non_multipart_body_is_rejected() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let request = Request::builder()
            .method("POST")
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, json) = send(app, request).await;
        assert!(status.is_client_error());
        assert_eq!(json["error"]["code"], "BAD_MULTIPART");
    }

    #[tokio::test]
    async fn oversized_upload_is_413() {
        let app = detection_router(ctx_with_doors(), 1024);
        let big = vec![0u8; 8 * 1024];
        let (status, json) =
            send(app, post_multipart(&[("files", Some("big.png"), &big[..])])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"]["code"], "BAD_MULTIPART");
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = detection_router(ctx_with_doors(), LIMIT);
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
