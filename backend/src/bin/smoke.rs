//! Smoke test against a running emotion service.
//!
//! Usage: `API_URL=http://localhost:5000 cargo run --bin smoke`

use std::io::Cursor;
use std::process::ExitCode;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, RgbImage};
use log::{error, info, warn};
use shared::{DegradedResponse, EmotionResponse, HealthResponse};

#[derive(Debug, thiserror::Error)]
enum SmokeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not build test image: {0}")]
    Image(#[from] image::ImageError),
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// 224x224 gradient, the same pattern on every run.
fn test_image_data_url() -> Result<String, SmokeError> {
    let img = RgbImage::from_fn(224, 224, |x, y| {
        image::Rgb([(y % 256) as u8, (x % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Jpeg)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(buf.into_inner())
    ))
}

async fn check_health(client: &reqwest::Client, base: &str) -> Result<HealthResponse, SmokeError> {
    let resp = client.get(format!("{base}/health")).send().await?;
    if !resp.status().is_success() {
        return Err(SmokeError::Status {
            status: resp.status(),
            body: resp.text().await?,
        });
    }
    Ok(resp.json().await?)
}

async fn check_detection(client: &reqwest::Client, base: &str) -> Result<(), SmokeError> {
    let image = test_image_data_url()?;
    let resp = client
        .post(format!("{base}/detect-emotion"))
        .json(&serde_json::json!({ "image": image }))
        .send()
        .await?;
    let status = resp.status();
    let body = resp.text().await?;
    if status != reqwest::StatusCode::OK {
        return Err(SmokeError::Status { status, body });
    }
    if let Ok(result) = serde_json::from_str::<EmotionResponse>(&body) {
        info!("   Emotion: {}", result.emotion);
        info!("   Confidence: {}", result.confidence);
        info!("   Processing Time: {}ms", result.processing_time_ms);
    } else if let Ok(degraded) = serde_json::from_str::<DegradedResponse>(&body) {
        warn!("   Degraded response: {}", degraded.error);
    }
    Ok(())
}

async fn check_rejections(client: &reqwest::Client, base: &str) -> Result<(), SmokeError> {
    for payload in [serde_json::json!({}), serde_json::json!({"image": "not-valid-base64!!"})] {
        let resp = client
            .post(format!("{base}/detect-emotion"))
            .json(&payload)
            .send()
            .await?;
        if resp.status() != reqwest::StatusCode::BAD_REQUEST {
            return Err(SmokeError::Status {
                status: resp.status(),
                body: resp.text().await?,
            });
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let base = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("❌ Could not build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("🚀 Testing API at: {}", base);

    match check_health(&client, &base).await {
        Ok(health) => info!("✅ Health check passed ({} @ {})", health.service, health.timestamp),
        Err(e) => {
            error!("❌ Health check failed: {}. Is the server running?", e);
            return ExitCode::FAILURE;
        }
    }

    let detection = check_detection(&client, &base).await;
    match &detection {
        Ok(()) => info!("✅ Emotion detection passed"),
        Err(SmokeError::Http(e)) if e.is_timeout() => {
            warn!("❌ Request timed out; the first request loads the model, try again")
        }
        Err(e) => error!("❌ Emotion detection failed: {}", e),
    }

    let rejections = check_rejections(&client, &base).await;
    match &rejections {
        Ok(()) => info!("✅ Invalid requests rejected with 400"),
        Err(e) => error!("❌ Validation check failed: {}", e),
    }

    if detection.is_ok() && rejections.is_ok() {
        info!("🎉 All checks passed");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
