use std::time::Instant;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::{HttpResponse, web};
use log::{error, info, warn};
use shared::{
    DegradedResponse, DetectEmotionRequest, Emotion, EmotionResponse, Endpoints, ErrorResponse,
    HealthResponse, NotFoundResponse, ServiceInfo,
};
use uuid::Uuid;

use crate::config::ServiceMetadata;
use crate::pipeline::{DetectionOutcome, Pipeline, RequestError, elapsed_ms};

const AVAILABLE_ENDPOINTS: [&str; 3] = ["/", "/health", "/detect-emotion"];
const DEGRADED_CONFIDENCE: f64 = 0.5;
/// Base64 images are large; actix's default payload limit is 256 KiB.
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
        .service(web::resource("/").route(web::get().to(service_info)))
        .service(web::resource("/health").route(web::get().to(health_check)))
        .service(
            web::resource("/detect-emotion")
                .route(web::post().to(detect_emotion))
                .route(web::method(actix_web::http::Method::OPTIONS).to(preflight)),
        );
}

async fn service_info(service: web::Data<ServiceMetadata>) -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        service: service.title.clone(),
        version: service.version.clone(),
        endpoints: Endpoints {
            health: "/health".to_string(),
            detect_emotion: "/detect-emotion (POST)".to_string(),
        },
        status: "running".to_string(),
    })
}

async fn health_check(service: web::Data<ServiceMetadata>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: service.name.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

/// Anything that is not a JSON object with a string `image` counts as a
/// request without image data.
fn parse_request(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<DetectEmotionRequest>(body)
        .ok()
        .and_then(|req| req.image)
}

async fn detect_emotion(pipeline: web::Data<Pipeline>, body: web::Bytes) -> HttpResponse {
    let started = Instant::now();
    let request_id = Uuid::new_v4();
    let image = parse_request(&body);

    let pipeline = pipeline.into_inner();
    let outcome = web::block(move || pipeline.detect(image.as_deref(), started)).await;

    match outcome {
        Ok(DetectionOutcome::Detected(result)) => {
            info!(
                "✅ [{}] Emotion: {} ({:.1}%) - {}ms",
                request_id,
                result.emotion,
                result.confidence * 100.0,
                result.processing_time_ms
            );
            HttpResponse::Ok().json(EmotionResponse {
                emotion: result.emotion,
                confidence: result.confidence,
                processing_time_ms: result.processing_time_ms,
                all_emotions: result.all_emotions.into(),
            })
        }
        Ok(DetectionOutcome::Degraded {
            error,
            processing_time_ms,
        }) => {
            error!("❌ [{}] Error processing image: {}", request_id, error);
            HttpResponse::Ok().json(DegradedResponse {
                emotion: Emotion::Neutral,
                confidence: DEGRADED_CONFIDENCE,
                error,
                processing_time_ms,
            })
        }
        Ok(DetectionOutcome::Rejected(rejection)) => {
            match &rejection {
                RequestError::MissingImage => {
                    warn!("[{}] Missing image data in request", request_id)
                }
                RequestError::InvalidBase64(e) => {
                    error!("[{}] Base64 decode error: {}", request_id, e)
                }
            }
            HttpResponse::BadRequest().json(ErrorResponse {
                error: rejection.to_string(),
                message: None,
            })
        }
        Err(e) => {
            let processing_time_ms = elapsed_ms(started);
            error!(
                "❌ [{}] Inference task failed after {}ms: {}",
                request_id, processing_time_ms, e
            );
            HttpResponse::Ok().json(DegradedResponse {
                emotion: Emotion::Neutral,
                confidence: DEGRADED_CONFIDENCE,
                error: e.to_string(),
                processing_time_ms,
            })
        }
    }
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(NotFoundResponse {
        error: "Endpoint not found".to_string(),
        available_endpoints: AVAILABLE_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
    })
}

/// Replaces the body of any 500 with the fixed diagnostic payload.
pub fn internal_error<B: MessageBody>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    error!(
        "Internal server error: {} {}",
        res.request().method(),
        res.request().path()
    );
    let (req, _) = res.into_parts();
    let response = HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR).json(ErrorResponse {
        error: "Internal server error".to_string(),
        message: Some("Please check server logs".to_string()),
    });
    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, response).map_into_right_body(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::StubModel;
    use crate::classifier::{EmotionClassifier, RawEmotionScores};
    use crate::config::{ModelConfig, WarmupConfig};
    use crate::decoder::tests::png_base64;
    use actix_web::middleware::ErrorHandlers;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn state(model: Arc<StubModel>) -> (web::Data<Pipeline>, web::Data<ServiceMetadata>) {
        let classifier =
            EmotionClassifier::new(model, &ModelConfig::default(), WarmupConfig::default());
        (
            web::Data::new(Pipeline::new(classifier, 1024)),
            web::Data::new(ServiceMetadata::default()),
        )
    }

    fn sad_model() -> Arc<StubModel> {
        Arc::new(StubModel::scoring(RawEmotionScores::from([
            ("sad", 80.0),
            ("angry", 40.0),
            ("fear", 10.0),
            ("happy", 2.0),
        ])))
    }

    macro_rules! app {
        ($model:expr) => {{
            let (pipeline, service) = state($model);
            test::init_service(
                App::new()
                    .wrap(
                        ErrorHandlers::new()
                            .handler(StatusCode::INTERNAL_SERVER_ERROR, internal_error),
                    )
                    .app_data(pipeline)
                    .app_data(service)
                    .configure(configure_routes)
                    .route(
                        "/boom",
                        web::get().to(|| async { HttpResponse::InternalServerError().body("raw") }),
                    )
                    .default_service(web::to(not_found)),
            )
            .await
        }};
    }

    macro_rules! post_json {
        ($app:expr, $body:expr) => {{
            let req = test::TestRequest::post()
                .uri("/detect-emotion")
                .set_json($body)
                .to_request();
            let resp = test::call_service($app, req).await;
            let status = resp.status();
            let body: Value = test::read_body_json(resp).await;
            (status, body)
        }};
    }

    #[actix_web::test]
    async fn root_describes_service() {
        let app = app!(sad_model());
        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["service"], "DeepFace Emotion Detection API");
        assert_eq!(body["status"], "running");
        assert_eq!(body["endpoints"]["detect_emotion"], "/detect-emotion (POST)");
    }

    #[actix_web::test]
    async fn health_reports_non_decreasing_timestamp() {
        let app = app!(sad_model());
        let first: HealthResponse =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request())
                .await;
        let second: HealthResponse =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request())
                .await;
        assert_eq!(first.status, "healthy");
        assert_eq!(first.service, "deepface-emotion-detector");
        assert!(second.timestamp >= first.timestamp);
    }

    #[actix_web::test]
    async fn missing_image_is_bad_request() {
        let app = app!(sad_model());
        let (status, body) = post_json!(&app, json!({}));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing image data");
    }

    #[actix_web::test]
    async fn non_json_body_is_missing_image() {
        let app = app!(sad_model());
        let req = test::TestRequest::post()
            .uri("/detect-emotion")
            .set_payload("image=abc")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn malformed_base64_is_bad_request() {
        let app = app!(sad_model());
        let (status, body) = post_json!(&app, json!({"image": "not-valid-base64!!"}));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid base64 image data");
    }

    #[actix_web::test]
    async fn detects_emotion_with_unclamped_confidence() {
        let app = app!(sad_model());
        let image = format!("data:image/png;base64,{}", png_base64(40, 30));
        let (status, body) = post_json!(&app, json!({ "image": image }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emotion"], "sad");
        assert_eq!(body["confidence"], 1.03);
        assert_eq!(body["all_emotions"]["happy"], 2.0);
        assert_eq!(body["all_emotions"]["neutral"], 0.0);
        assert!(body["processing_time_ms"].as_f64().unwrap() >= 0.0);
        assert!(body.get("error").is_none());
    }

    #[actix_web::test]
    async fn unparseable_image_degrades_to_neutral() {
        let app = app!(sad_model());
        let payload =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"not an image");
        let (status, body) = post_json!(&app, json!({ "image": payload }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emotion"], "neutral");
        assert_eq!(body["confidence"], 0.5);
        assert!(body["error"].is_string());
        assert!(body["processing_time_ms"].is_number());
    }

    #[actix_web::test]
    async fn model_failure_degrades_to_neutral() {
        let app = app!(Arc::new(StubModel::failing("out of memory")));
        let (status, body) = post_json!(&app, json!({ "image": png_base64(16, 16) }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emotion"], "neutral");
        assert_eq!(body["error"], "Model inference error: out of memory");
    }

    #[actix_web::test]
    async fn panicking_model_degrades_instead_of_server_error() {
        let app = app!(Arc::new(StubModel::with_fallback(|| {
            panic!("index out of range")
        })));
        let (status, body) = post_json!(&app, json!({ "image": png_base64(16, 16) }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["emotion"], "neutral");
        assert_eq!(body["confidence"], 0.5);
        assert_eq!(
            body["error"],
            "Model inference error: model panicked: index out of range"
        );

        // the worker is still usable afterwards
        let (status, _) = post_json!(&app, json!({ "image": png_base64(16, 16) }));
        assert_eq!(status, StatusCode::OK);
    }

    #[actix_web::test]
    async fn options_preflight_is_no_content() {
        let app = app!(sad_model());
        let req = test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/detect-emotion")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }

    #[actix_web::test]
    async fn unknown_route_lists_endpoints() {
        let app = app!(sad_model());
        let req = test::TestRequest::get().uri("/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Endpoint not found");
        assert_eq!(body["available_endpoints"], json!(AVAILABLE_ENDPOINTS));
    }

    #[actix_web::test]
    async fn server_errors_use_fixed_body() {
        let app = app!(sad_model());
        let req = test::TestRequest::get().uri("/boom").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(
            body,
            json!({"error": "Internal server error", "message": "Please check server logs"})
        );
    }
}
