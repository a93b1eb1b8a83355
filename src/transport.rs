//! Outbound HTTP through a forward proxy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::FetchFailure;
use crate::proxy::to_reqwest_proxy;

/// One GET routed through one proxy.
#[derive(Debug, Clone)]
pub struct ProxiedGet<'a> {
    pub url: &'a str,
    pub proxy: &'a str,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

/// A response received through a proxy, body already read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// Something that can issue a GET through a proxy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: ProxiedGet<'_>) -> Result<FetchResponse, FetchFailure>;
}

/// `Transport` backed by reqwest, one client per proxy.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: ProxiedGet<'_>) -> Result<FetchResponse, FetchFailure> {
        let client = proxied_client(request.proxy, request.timeout)
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let response = client
            .get(request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await.map_err(|e| classify_error(&e))?;
        Ok(FetchResponse { url, status, body })
    }
}

/// Build a client that routes every request through `proxy`.
pub(crate) fn proxied_client(
    proxy: &str,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .proxy(to_reqwest_proxy(proxy)?)
        .timeout(timeout)
        .build()
}

pub(crate) fn classify_error(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else if err.is_connect() {
        FetchFailure::Connect(err.to_string())
    } else {
        FetchFailure::Transport(err.to_string())
    }
}
