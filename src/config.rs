use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    /// Public site root, used for share pages and the sitemap.
    pub site_url: String,
    /// Recency window fetched for the feed before the client shuffles it.
    pub feed_fetch_limit: usize,
    pub max_image_width: u32,
    pub max_image_bytes: usize,
    pub catbox_url: String,
    /// NSFW classifier endpoint; uploads skip moderation when unset.
    pub moderation_url: Option<String>,
    pub r2_endpoint: Option<String>,
    /// Public domain images are served from after an R2 upload. Left
    /// unset, the R2 path fails hard before writing anything.
    pub r2_public_domain: Option<String>,
    pub r2_token: Option<String>,
    /// Path of a JSON file mapping bearer tokens to signed-in users.
    pub auth_tokens_path: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "1111"),
            site_url: try_load("SITE_URL", "http://localhost:5173"),
            feed_fetch_limit: try_load("FEED_FETCH_LIMIT", "500"),
            max_image_width: try_load("MAX_IMAGE_WIDTH", "1920"),
            max_image_bytes: try_load("MAX_IMAGE_BYTES", "5242880"),
            catbox_url: try_load("CATBOX_URL", "https://catbox.moe/user/api.php"),
            moderation_url: var("MODERATION_URL").ok(),
            r2_endpoint: var("R2_ENDPOINT").ok(),
            r2_public_domain: var("R2_PUBLIC_DOMAIN").ok(),
            r2_token: try_read_secret("R2_TOKEN"),
            auth_tokens_path: var("AUTH_TOKENS_PATH").ok(),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn try_read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}
