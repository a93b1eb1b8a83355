//! Single-attempt fetch through a proxy, with outcome reporting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::{info, warn};
use tokio::sync::watch;

use crate::config::PoolConfig;
use crate::error::{Error, FetchFailure, Result};
use crate::identity::Identity;
use crate::lifecycle::ProxyLifecycle;
use crate::transport::{FetchResponse, ProxiedGet, Transport};

type Throttle = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Issues one GET through one proxy and relabels the proxy by the outcome.
pub struct FetchExecutor {
    config: Arc<PoolConfig>,
    lifecycle: ProxyLifecycle,
    transport: Arc<dyn Transport>,
    throttle: Option<Throttle>,
    shutdown: watch::Receiver<bool>,
}

impl FetchExecutor {
    pub fn new(
        config: Arc<PoolConfig>,
        lifecycle: ProxyLifecycle,
        transport: Arc<dyn Transport>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        // One request every 1/rps seconds.
        let throttle = config
            .max_requests_per_second
            .and_then(|rps| Duration::try_from_secs_f64(1.0 / rps).ok())
            .and_then(Quota::with_period)
            .map(RateLimiter::direct);
        Self {
            config,
            lifecycle,
            transport,
            throttle,
            shutdown,
        }
    }

    /// Fetch `url` through `proxy` presenting `identity`.
    ///
    /// A response whose status is in the valid-status list marks the proxy
    /// working and is returned. Anything else marks it not working and
    /// yields [`Error::FetchFailed`].
    pub async fn fetch(
        &self,
        url: &str,
        proxy: &str,
        identity: &Identity,
    ) -> Result<FetchResponse> {
        url::Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        info!("Using proxy {} for {}", proxy, url);
        let request = ProxiedGet {
            url,
            proxy,
            headers: identity.headers(),
            timeout: self.config.request_timeout,
        };
        let outcome = self.guarded(proxy, self.transport.get(request)).await?;

        match outcome {
            Ok(response) if self.config.is_valid_status(response.status) => {
                self.lifecycle.mark_working(proxy).await?;
                info!("Response status OK ({}) via {}", response.status, proxy);
                Ok(response)
            }
            Ok(response) => self.fail(proxy, FetchFailure::Status(response.status)).await,
            Err(cause) => self.fail(proxy, cause).await,
        }
    }

    /// Fetch with a freshly drawn identity.
    pub async fn fetch_rotated(&self, url: &str, proxy: &str) -> Result<FetchResponse> {
        let identity = Identity::random(&self.config);
        self.fetch(url, proxy, &identity).await
    }

    /// Probe `proxy` against the configured probe URL. Returns whether it works.
    pub async fn validate(&self, proxy: &str) -> Result<bool> {
        info!("Checking proxy {}", proxy);
        match self.fetch_rotated(&self.config.probe_url, proxy).await {
            Ok(_) => Ok(true),
            Err(Error::FetchFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Run one network call through `proxy` under the pool's admission rules.
    ///
    /// Refuses with [`Error::ShuttingDown`] once shutdown was requested,
    /// waits on the throttle, bounds the call by the request timeout and
    /// aborts it with [`FetchFailure::Cancelled`] on shutdown. If the
    /// returned future is dropped mid-call the proxy is marked not working.
    /// Classifying the outcome is left to the caller.
    pub(crate) async fn guarded<T, F>(
        &self,
        proxy: &str,
        call: F,
    ) -> Result<std::result::Result<T, FetchFailure>>
    where
        F: Future<Output = std::result::Result<T, FetchFailure>>,
    {
        if *self.shutdown.borrow() {
            return Err(Error::ShuttingDown);
        }
        if let Some(throttle) = &self.throttle {
            throttle.until_ready().await;
        }

        let mut in_flight = InFlight::arm(self.lifecycle.clone(), proxy);
        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            result = tokio::time::timeout(self.config.request_timeout, call) => {
                result.unwrap_or(Err(FetchFailure::Timeout))
            }
            _ = shutdown_signalled(&mut shutdown) => Err(FetchFailure::Cancelled),
        };
        in_flight.disarm();
        Ok(outcome)
    }

    async fn fail(&self, proxy: &str, cause: FetchFailure) -> Result<FetchResponse> {
        self.lifecycle.mark_not_working(proxy).await?;
        warn!("Response status FAILED via {}: {}", proxy, cause);
        Err(Error::FetchFailed {
            proxy: proxy.to_string(),
            cause,
        })
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: shutdown can no longer be requested.
            std::future::pending::<()>().await;
        }
    }
}

/// Marks the proxy not working if the fetch is dropped before it completes.
struct InFlight {
    lifecycle: ProxyLifecycle,
    proxy: Option<String>,
}

impl InFlight {
    fn arm(lifecycle: ProxyLifecycle, proxy: &str) -> Self {
        Self {
            lifecycle,
            proxy: Some(proxy.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.proxy = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(proxy) = self.proxy.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let lifecycle = self.lifecycle.clone();
            handle.spawn(async move {
                if let Err(e) = lifecycle.mark_not_working(&proxy).await {
                    warn!("Failed to release aborted proxy {}: {}", proxy, e);
                }
            });
        }
    }
}
