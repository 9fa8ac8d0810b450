//! reqwest-backed [`Transport`] for remote station logos.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};

use crate::config::FetchConfig;
use crate::error::TransportError;
use crate::fetcher::Transport;

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_bytes: u64,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_logo_bytes,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        read_capped(response, self.max_bytes).await
    }
}

fn too_large(limit: u64) -> TransportError {
    TransportError::Request(format!("response exceeds {limit} bytes"))
}

/// Read the body, giving up as soon as it is known to exceed `limit`.
async fn read_capped(mut response: Response, limit: u64) -> Result<Vec<u8>, TransportError> {
    if response.content_length().is_some_and(|len| len > limit) {
        return Err(too_large(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?
    {
        if body.len() as u64 + chunk.len() as u64 > limit {
            return Err(too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
