//! # HTTP surface
//!
//! The JSON endpoints the web client's remote calls land on, plus the
//! standalone utility endpoints: random sample, share preview, sitemap,
//! download proxy, and the two hosted-upload paths.
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    auth::require_actor,
    error::AppError,
    likes::{commit_like, LikeOutcome},
    models::{Image, ImageMetaUpdate, NewImage, ProfileUser},
    notifications::NOTIFICATION_LIMIT,
    shuffle::shuffle,
    state::State as AppState,
    upload::{moderate, process_image, sanitize_filename, upload_to_catbox, upload_to_r2},
};

pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Image>>, AppError> {
    let images = state
        .store
        .list_images_recent(state.config.feed_fetch_limit)
        .await?;

    Ok(Json(images))
}

pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Image>, AppError> {
    let image = state
        .store
        .get_image(&id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(image))
}

pub async fn create_image_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewImage>,
) -> Result<Json<Image>, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    let image = Image::new(&actor, payload);
    state.store.add_image(image.clone()).await?;

    Ok(Json(image))
}

pub async fn edit_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<ImageMetaUpdate>,
) -> Result<StatusCode, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    state
        .store
        .update_image_meta(&id, &actor.uid, update)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    state.store.delete_image(&id, &actor.uid).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Server side of the like toggle: one atomic like write, plus the
/// notification rule on the like transition.
pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LikeOutcome>, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    let image = state
        .store
        .get_image(&id)
        .await?
        .ok_or(AppError::NotFound)?;
    let liked = !image.liked_by_user(&actor.uid);

    commit_like(state.store.as_ref(), &image, &actor, liked).await?;

    let like_count = if liked {
        image.like_count + 1
    } else {
        image.like_count.saturating_sub(1)
    };

    Ok(Json(LikeOutcome { liked, like_count }))
}

pub async fn profile_images_handler(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<Image>>, AppError> {
    let images = state.store.list_images_by_uploader(&uid).await?;

    Ok(Json(images))
}

pub async fn profile_user_handler(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<ProfileUser>, AppError> {
    let images = state.store.list_images_by_uploader(&uid).await?;
    let user = images.first().map(ProfileUser::from).ok_or(AppError::NotFound)?;

    Ok(Json(user))
}

pub async fn notifications_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::models::Notification>>, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    let notifications = state
        .store
        .list_notifications(&actor.uid, NOTIFICATION_LIMIT)
        .await?;

    Ok(Json(notifications))
}

#[derive(Deserialize)]
pub struct MarkReadPayload {
    pub ids: Vec<String>,
}

pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<MarkReadPayload>,
) -> Result<StatusCode, AppError> {
    let actor = require_actor(state.auth.as_ref(), &headers).await?;

    state
        .store
        .mark_notifications_read(&actor.uid, &payload.ids)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RandomParams {
    pub category: Option<String>,
    pub title: Option<String>,
    pub limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(1).clamp(1, 20)
}

/// Random sample over the recency window: fetch, filter, shuffle in
/// memory, take the first `limit`. Cheap at current collection sizes.
pub async fn random_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomParams>,
) -> Result<Json<Vec<Image>>, AppError> {
    let mut images = state
        .store
        .list_images_recent(state.config.feed_fetch_limit)
        .await?;

    if let Some(category) = &params.category {
        images.retain(|image| {
            image
                .flags
                .iter()
                .any(|flag| flag.eq_ignore_ascii_case(category))
        });
    }
    if let Some(title) = &params.title {
        let needle = title.to_lowercase();
        images.retain(|image| image.title.to_lowercase().contains(&needle));
    }

    shuffle(&mut images);
    images.truncate(clamp_limit(params.limit));

    Ok(Json(images))
}

fn is_bot(user_agent: &str) -> bool {
    let bots = Regex::new(r"(?i)bot|crawl|spider|preview|embed|facebookexternalhit|whatsapp|telegram|slack|discord|twitter")
        .unwrap();

    bots.is_match(user_agent)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Deserialize)]
pub struct ShareParams {
    pub id: String,
}

/// Social crawlers get a preview-tag page; browsers get redirected to the
/// image view.
pub async fn share_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ShareParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let image = state
        .store
        .get_image(&params.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let target = format!(
        "{}/image/{}",
        state.config.site_url.trim_end_matches('/'),
        image.id
    );

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !is_bot(user_agent) {
        return Ok(Redirect::to(&target).into_response());
    }

    // Everything interpolated below is client-supplied at some point,
    // the image URL included.
    let title = escape_html(&image.title);
    let author = escape_html(&image.uploader_name);
    let image_url = escape_html(&image.image_url);
    let target = escape_html(&target);
    let page = format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<meta property="og:type" content="website">
<meta property="og:title" content="{title}">
<meta property="og:description" content="Shared by {author}">
<meta property="og:image" content="{image_url}">
<meta property="og:url" content="{target}">
<meta name="twitter:card" content="summary_large_image">
<meta name="twitter:image" content="{image_url}">
</head>
<body></body>
</html>"#
    );

    Ok(Html(page).into_response())
}

pub async fn sitemap_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let site = state.config.site_url.trim_end_matches('/');

    let mut entries = String::new();
    for path in ["", "/explore", "/upload", "/terms", "/privacy"] {
        entries.push_str(&format!("<url><loc>{site}{path}</loc></url>"));
    }
    for image in state
        .store
        .list_images_recent(state.config.feed_fetch_limit)
        .await?
    {
        entries.push_str(&format!(
            "<url><loc>{site}/image/{}</loc><lastmod>{}</lastmod></url>",
            image.id,
            image.uploaded_at.format("%Y-%m-%d"),
        ));
    }

    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</urlset>"#
    );

    Ok((
        [(header::CONTENT_TYPE, "application/xml")],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
pub struct DownloadParams {
    pub url: String,
    pub filename: Option<String>,
}

/// Streams a remote file back as an attachment so the browser downloads
/// instead of navigating.
pub async fn download_proxy_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, AppError> {
    if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
        return Err(AppError::MalformedPayload);
    }

    let upstream = state
        .http
        .get(&params.url)
        .send()
        .await?
        .error_for_status()?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let filename = sanitize_filename(params.filename.as_deref().unwrap_or("download"));

    let body = Body::from_stream(upstream.bytes_stream());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub file_name: String,
    pub data: String,
}

#[derive(Serialize)]
pub struct HostedUrl {
    pub url: String,
}

fn decode_payload(payload: &UploadPayload) -> Result<Vec<u8>, AppError> {
    base64::engine::general_purpose::STANDARD
        .decode(&payload.data)
        .map_err(|_| AppError::MalformedPayload)
}

pub async fn upload_catbox_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadPayload>,
) -> Result<Json<HostedUrl>, AppError> {
    let bytes = decode_payload(&payload)?;
    let processed = process_image(&state.config, &bytes)?;
    moderate(&state.http, &state.config, &processed).await?;

    let url = upload_to_catbox(&state.http, &state.config, &payload.file_name, processed).await?;

    Ok(Json(HostedUrl { url }))
}

pub async fn upload_r2_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadPayload>,
) -> Result<Json<HostedUrl>, AppError> {
    let bytes = decode_payload(&payload)?;
    let processed = process_image(&state.config, &bytes)?;
    moderate(&state.http, &state.config, &processed).await?;

    let url = upload_to_r2(&state.http, &state.config, &payload.file_name, processed).await?;

    Ok(Json(HostedUrl { url }))
}
