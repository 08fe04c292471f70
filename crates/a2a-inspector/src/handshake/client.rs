//! HTTP client for `POST /agent-card`.

use std::time::Duration;

use a2a_inspector_protocol::{CardErrorResponse, CardRequest, CardResponse, CustomHeaders};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::instrument;

use super::{CardFetcher, FetchRequest};
use crate::config::ServerConfig;
use crate::error::{HandshakeError, HandshakeResult};

/// Fetches agent cards from the inspector backend.
#[derive(Debug, Clone)]
pub struct HttpCardFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCardFetcher {
    pub fn new(base_url: &str, card_path: &str, timeout: Duration) -> HandshakeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), card_path),
        })
    }

    pub fn from_config(config: &ServerConfig) -> HandshakeResult<Self> {
        Self::new(
            &config.base_url,
            &config.card_path,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl CardFetcher for HttpCardFetcher {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch_card(&self, request: FetchRequest) -> HandshakeResult<CardResponse> {
        let body = CardRequest {
            url: request.url,
            sid: request.sid,
        };

        debug!("Fetching agent card via {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .headers(merge_headers(&request.headers))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<CardErrorResponse>(&text)
                .ok()
                .and_then(|body| body.error)
                .filter(|error| !error.is_empty());
            return Err(match message {
                Some(message) => HandshakeError::Rejected(message),
                None => HandshakeError::Status(status.as_u16()),
            });
        }

        serde_json::from_str(&text).map_err(|e| HandshakeError::ParseError(e.to_string()))
    }
}

/// Build request headers: `Content-Type: application/json` plus the
/// operator's headers. Operator headers never replace the content type.
pub fn merge_headers(custom: &CustomHeaders) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in custom {
        if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            debug!("Ignoring custom Content-Type header");
            continue;
        }
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .zip(HeaderValue::from_str(value).ok());
        match parsed {
            Some((name, value)) => {
                headers.insert(name, value);
            }
            None => warn!("Skipping invalid custom header '{}'", name),
        }
    }

    headers
}
