//! Middleware implementation for reqwest.

use crate::error::{Error, FetchFailure};
use crate::identity::Identity;
use crate::pool::ProxyPool;
use crate::transport::{classify_error, proxied_client};

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error as MiddlewareError, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends every request through a proxy from the pool.
///
/// Requests are retried on fresh proxies up to `max_attempts` times. Each
/// attempt relabels the proxy it used, exactly as a pool fetch does, and
/// obeys the pool's throttle and shutdown signal.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    pool: Arc<ProxyPool>,
}

impl ProxyPoolMiddleware {
    pub fn new(pool: Arc<ProxyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }
}

fn middleware_error(err: Error) -> MiddlewareError {
    MiddlewareError::Middleware(anyhow!(err))
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let config = &self.pool.config;
        let lifecycle = self.pool.lifecycle();
        let executor = self.pool.executor();
        let url = req.url().to_string();
        let mut attempts = 0;

        while attempts < config.max_attempts {
            let proxy = self.pool.select_proxy().await.map_err(middleware_error)?;

            let mut proxied_request = req.try_clone().ok_or_else(|| {
                MiddlewareError::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                        .to_string()
                ))
            })?;
            Identity::random(config).apply_to(proxied_request.headers_mut());
            info!("Using proxy: {} (attempt {})", proxy, attempts + 1);

            let client =
                proxied_client(&proxy, config.request_timeout).map_err(MiddlewareError::Reqwest)?;
            let call = async move {
                client
                    .execute(proxied_request)
                    .await
                    .map_err(|e| classify_error(&e))
            };
            let outcome = executor
                .guarded(&proxy, call)
                .await
                .map_err(middleware_error)?;

            attempts += 1;
            let cause = match outcome {
                Ok(response) if config.is_valid_status(response.status().as_u16()) => {
                    lifecycle.mark_working(&proxy).await.map_err(middleware_error)?;
                    return Ok(response);
                }
                Ok(response) => FetchFailure::Status(response.status().as_u16()),
                Err(cause) => cause,
            };
            warn!(
                "Request to {} failed with proxy {} (attempt {}): {}",
                url, proxy, attempts, cause
            );
            lifecycle
                .mark_not_working(&proxy)
                .await
                .map_err(middleware_error)?;
        }

        Err(middleware_error(Error::RetryExhausted { url, attempts }))
    }
}
