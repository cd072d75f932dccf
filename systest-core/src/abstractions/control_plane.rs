//! Control-plane reachability
//!
//! The lifecycle manager only needs to know whether netmaster answers a basic
//! object read. The payload is ignored.

use crate::error::{SystestError, SystestResult};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Read access to the fabric's control-plane API
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Fetch a tenant by name; success means the API served the request
    async fn tenant_get(&self, tenant: &str) -> SystestResult<()>;
}

/// REST client against netmaster
#[derive(Debug, Clone)]
pub struct HttpControlPlaneClient {
    base_url: url::Url,
    client: reqwest::Client,
}

impl HttpControlPlaneClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> SystestResult<Self> {
        let base_url = url::Url::parse(base_url).map_err(|e| {
            SystestError::configuration(
                "testbed.control_plane_url",
                format!("invalid URL '{}': {}", base_url, e),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn tenant_url(&self, tenant: &str) -> SystestResult<url::Url> {
        self.base_url
            .join(&format!("api/v1/tenants/{}/", tenant))
            .map_err(|e| SystestError::ControlPlane {
                request: format!("tenant_get({})", tenant),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ControlPlaneClient for HttpControlPlaneClient {
    async fn tenant_get(&self, tenant: &str) -> SystestResult<()> {
        let url = self.tenant_url(tenant)?;
        debug!("GET {}", url);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Control-plane stub that fails a configurable number of reads first
#[derive(Debug, Clone, Default)]
pub struct MockControlPlane {
    failures_left: Arc<Mutex<Option<u32>>>,
    calls: Arc<Mutex<u32>>,
}

impl MockControlPlane {
    /// Always answers
    pub fn available() -> Self {
        Self::failing(0)
    }

    /// Fails the first `failures` reads, then answers
    pub fn failing(failures: u32) -> Self {
        Self {
            failures_left: Arc::new(Mutex::new(Some(failures))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Never answers
    pub fn unavailable() -> Self {
        Self {
            failures_left: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl ControlPlaneClient for MockControlPlane {
    async fn tenant_get(&self, tenant: &str) -> SystestResult<()> {
        *self.calls.lock() += 1;
        let mut left = self.failures_left.lock();
        match left.as_mut() {
            Some(0) => Ok(()),
            Some(n) => {
                *n -= 1;
                Err(SystestError::ControlPlane {
                    request: format!("tenant_get({})", tenant),
                    message: "connection refused".to_string(),
                })
            }
            None => Err(SystestError::ControlPlane {
                request: format!("tenant_get({})", tenant),
                message: "connection refused".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_url() {
        let client =
            HttpControlPlaneClient::new("http://localhost:9999", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.tenant_url("default").unwrap().as_str(),
            "http://localhost:9999/api/v1/tenants/default/"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpControlPlaneClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_mock_fails_then_answers() {
        let cp = MockControlPlane::failing(2);
        assert!(cp.tenant_get("default").await.is_err());
        assert!(cp.tenant_get("default").await.is_err());
        assert!(cp.tenant_get("default").await.is_ok());
        assert_eq!(cp.calls(), 3);
    }
}
