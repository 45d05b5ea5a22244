use std::sync::Arc;

use crate::{
    auth::{AuthProvider, TokenTableAuth},
    config::Config,
    store::{DocumentStore, MemoryStore},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub http: reqwest::Client,
}

impl State {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let auth: Arc<dyn AuthProvider> = match &config.auth_tokens_path {
            Some(path) => Arc::new(TokenTableAuth::from_file(path)),
            None => Arc::new(TokenTableAuth::empty()),
        };

        Arc::new(Self {
            config,
            store: Arc::new(MemoryStore::new()),
            auth,
            http: reqwest::Client::new(),
        })
    }

    #[cfg(test)]
    pub fn for_tests(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthProvider>) -> Arc<Self> {
        Arc::new(Self {
            config: Config {
                port: 0,
                site_url: "http://localhost:5173".to_string(),
                feed_fetch_limit: 500,
                max_image_width: 1920,
                max_image_bytes: 5 * 1024 * 1024,
                catbox_url: String::new(),
                moderation_url: None,
                r2_endpoint: None,
                r2_public_domain: None,
                r2_token: None,
                auth_tokens_path: None,
            },
            store,
            auth,
            http: reqwest::Client::new(),
        })
    }
}
