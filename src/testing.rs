//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;

use crate::config::PoolConfig;
use crate::error::FetchFailure;
use crate::pool::ProxyPool;
use crate::storage::MemoryStorage;
use crate::transport::{FetchResponse, ProxiedGet, Transport};

/// How the scripted transport answers a request through a given proxy.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Status(u16),
    Page(u16, &'static str),
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub url: String,
    pub proxy: String,
    pub headers: HeaderMap,
}

pub(crate) struct ScriptedTransport {
    default: Behavior,
    per_proxy: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(default: Behavior) -> Self {
        Self {
            default,
            per_proxy: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, proxy: &str, behavior: Behavior) {
        self.per_proxy.lock().insert(proxy.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.url == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: ProxiedGet<'_>) -> Result<FetchResponse, FetchFailure> {
        self.calls.lock().push(Call {
            url: request.url.to_string(),
            proxy: request.proxy.to_string(),
            headers: request.headers.clone(),
        });
        let behavior = self
            .per_proxy
            .lock()
            .get(request.proxy)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        let respond = |status: u16, body: &str| FetchResponse {
            url: request.url.to_string(),
            status,
            body: body.to_string(),
        };
        match behavior {
            Behavior::Status(status) => Ok(respond(status, "<html><body></body></html>")),
            Behavior::Page(status, body) => Ok(respond(status, body)),
            Behavior::Fail => Err(FetchFailure::Connect("connection refused".into())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

pub(crate) fn test_config() -> PoolConfig {
    PoolConfig::builder()
        .probe_url("http://probe.test/")
        .request_timeout(Duration::from_millis(100))
        .build()
}

pub(crate) fn addresses(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}.{}:8080", prefix, i)).collect()
}

pub(crate) fn scripted_pool(
    config: PoolConfig,
    default: Behavior,
) -> (Arc<ProxyPool>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(default));
    let pool = ProxyPool::with_transport(config, Arc::new(MemoryStorage::new()), transport.clone());
    (Arc::new(pool), transport)
}
