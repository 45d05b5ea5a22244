//! # Upload pipeline
//!
//! Compression, moderation, and hosting for uploaded images. Hosting and
//! classification are external services; this module only shapes the bytes
//! and talks to them. Moderation fails open so a classifier outage never
//! blocks uploads; a positive verdict still rejects.
use std::io::Cursor;

use image::{imageops::FilterType, ImageFormat};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{config::Config, error::AppError};

/// Decode, cap the width, and re-encode as JPEG.
///
/// Images wider than the configured maximum are scaled down preserving
/// aspect ratio. Output still over the byte limit is rejected outright.
pub fn process_image(config: &Config, bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    let decoded = image::load_from_memory(bytes).map_err(|_| AppError::MalformedPayload)?;

    let resized = if decoded.width() > config.max_image_width {
        let scale = config.max_image_width as f64 / decoded.width() as f64;
        let height = ((decoded.height() as f64 * scale).round() as u32).max(1);

        info!(
            "Resizing upload from {}x{} to {}x{}",
            decoded.width(),
            decoded.height(),
            config.max_image_width,
            height
        );
        decoded.resize_exact(config.max_image_width, height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .to_rgb8()
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| AppError::Internal(Box::new(e)))?;
    let out = out.into_inner();

    if out.len() > config.max_image_bytes {
        return Err(AppError::ImageTooLarge);
    }

    Ok(out)
}

#[derive(Deserialize)]
struct ModerationVerdict {
    nsfw: bool,
}

/// Run the NSFW classifier over the processed bytes.
///
/// No classifier configured, or a classifier that is down or answering
/// garbage, all count as safe. A positive verdict rejects the upload.
pub async fn moderate(
    client: &reqwest::Client,
    config: &Config,
    bytes: &[u8],
) -> Result<(), AppError> {
    let Some(url) = &config.moderation_url else {
        return Ok(());
    };

    let verdict = async {
        client
            .post(url)
            .body(bytes.to_vec())
            .send()
            .await?
            .json::<ModerationVerdict>()
            .await
    }
    .await;

    match verdict {
        Ok(ModerationVerdict { nsfw: true }) => Err(AppError::ModerationRejected),
        Ok(ModerationVerdict { nsfw: false }) => Ok(()),
        Err(err) => {
            warn!("Moderation service unavailable, treating upload as safe: {err}");
            Ok(())
        }
    }
}

/// Strip anything that should not end up in a hosted object key.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "upload.jpg".to_string()
    } else {
        cleaned
    }
}

/// Push the processed bytes to catbox and hand back the hosted URL.
pub async fn upload_to_catbox(
    client: &reqwest::Client,
    config: &Config,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let part = Part::bytes(bytes)
        .file_name(sanitize_filename(filename))
        .mime_str("image/jpeg")
        .map_err(AppError::Upstream)?;
    let form = Form::new()
        .text("reqtype", "fileupload")
        .part("fileToUpload", part);

    let response = client
        .post(&config.catbox_url)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;
    let url = response.text().await?.trim().to_string();

    if !url.starts_with("http") {
        return Err(AppError::Misconfigured("catbox returned no URL"));
    }

    Ok(url)
}

/// Push the processed bytes to the R2 bucket.
///
/// Both the bucket endpoint and the public serving domain must be
/// configured; otherwise this is a hard error before anything is written.
pub async fn upload_to_r2(
    client: &reqwest::Client,
    config: &Config,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let endpoint = config
        .r2_endpoint
        .as_deref()
        .ok_or(AppError::Misconfigured("R2 endpoint not configured"))?;
    let domain = config
        .r2_public_domain
        .as_deref()
        .ok_or(AppError::Misconfigured("R2 public domain not configured"))?;

    let key = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));

    let mut request = client
        .put(format!("{}/{}", endpoint.trim_end_matches('/'), key))
        .header("Content-Type", "image/jpeg")
        .body(bytes);
    if let Some(token) = &config.r2_token {
        request = request.bearer_auth(token);
    }

    request.send().await?.error_for_status()?;

    Ok(format!("{}/{}", domain.trim_end_matches('/'), key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn config() -> Config {
        Config {
            port: 0,
            site_url: "http://localhost".to_string(),
            feed_fetch_limit: 500,
            max_image_width: 50,
            max_image_bytes: 5 * 1024 * 1024,
            catbox_url: String::new(),
            moderation_url: None,
            r2_endpoint: None,
            r2_public_domain: None,
            r2_token: None,
            auth_tokens_path: None,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_wide_image_is_scaled_down() {
        let processed = process_image(&config(), &png_bytes(100, 40)).unwrap();

        let reloaded = image::load_from_memory(&processed).unwrap();
        assert_eq!(reloaded.width(), 50);
        assert_eq!(reloaded.height(), 20);
    }

    #[test]
    fn test_narrow_image_untouched_dimensions() {
        let processed = process_image(&config(), &png_bytes(30, 60)).unwrap();

        let reloaded = image::load_from_memory(&processed).unwrap();
        assert_eq!(reloaded.width(), 30);
        assert_eq!(reloaded.height(), 60);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = process_image(&config(), b"definitely not an image").unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload));
    }

    #[test]
    fn test_size_cap() {
        let mut small = config();
        small.max_image_bytes = 10;

        let err = process_image(&small, &png_bytes(40, 40)).unwrap_err();
        assert!(matches!(err, AppError::ImageTooLarge));
    }

    #[tokio::test]
    async fn test_moderation_disabled_passes() {
        let client = reqwest::Client::new();
        moderate(&client, &config(), b"anything").await.unwrap();
    }

    async fn spawn_classifier(nsfw: bool) -> String {
        let app = axum::Router::new().route(
            "/classify",
            axum::routing::post(move || async move {
                axum::Json(serde_json::json!({ "nsfw": nsfw }))
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}/classify")
    }

    #[tokio::test]
    async fn test_moderation_rejects_on_verdict() {
        let mut cfg = config();
        cfg.moderation_url = Some(spawn_classifier(true).await);

        let err = moderate(&reqwest::Client::new(), &cfg, b"bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ModerationRejected));
    }

    #[tokio::test]
    async fn test_moderation_passes_safe_verdict() {
        let mut cfg = config();
        cfg.moderation_url = Some(spawn_classifier(false).await);

        moderate(&reqwest::Client::new(), &cfg, b"bytes")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_moderation_outage_fails_open() {
        // Grab a free port, then close it so the connection is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut cfg = config();
        cfg.moderation_url = Some(format!("http://{addr}/classify"));

        moderate(&reqwest::Client::new(), &cfg, b"bytes")
            .await
            .unwrap();
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my pic (1).jpg"), "my_pic__1_.jpg");
        assert_eq!(sanitize_filename(""), "upload.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
    }
}
