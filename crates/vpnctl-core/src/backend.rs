//! Backend seams.
//!
//! The components only see these traits; the live implementations wrap
//! [`PrimaryBackend`] and [`SecondaryBackend`], tests use in-memory fakes.

use std::future::Future;
use std::sync::Arc;
use vpnctl_net::{BackendError, PrimaryBackend, SecondaryBackend, ServerEntry, StatusReport};

/// Source of the authoritative connection status
pub trait StatusApi: Send + Sync + 'static {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusReport, BackendError>> + Send;
}

/// Connect/disconnect endpoint. `Ok(())` means the backend confirmed the action.
pub trait ActionApi: Send + Sync + 'static {
    fn connect(&self, country: Option<&str>)
    -> impl Future<Output = Result<(), BackendError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// What a catalog query returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogReport {
    /// Entries in backend order
    pub servers: Vec<ServerEntry>,
    /// The catalog backend's own view of the tunnel, when it sent one
    pub running: Option<bool>,
}

/// Source of the exit-country catalog
pub trait CatalogApi: Send + Sync + 'static {
    fn fetch_catalog(&self) -> impl Future<Output = Result<CatalogReport, BackendError>> + Send;
}

impl<T: StatusApi> StatusApi for Arc<T> {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusReport, BackendError>> + Send {
        (**self).fetch_status()
    }
}

impl<T: ActionApi> ActionApi for Arc<T> {
    fn connect(
        &self,
        country: Option<&str>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).connect(country)
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), BackendError>> + Send {
        (**self).disconnect()
    }
}

impl<T: CatalogApi> CatalogApi for Arc<T> {
    fn fetch_catalog(&self) -> impl Future<Output = Result<CatalogReport, BackendError>> + Send {
        (**self).fetch_catalog()
    }
}

fn flag(action: &str, ok: bool) -> Result<(), BackendError> {
    if ok {
        Ok(())
    } else {
        Err(BackendError::Rejected(format!("{action} reported failure")))
    }
}

impl StatusApi for PrimaryBackend {
    async fn fetch_status(&self) -> Result<StatusReport, BackendError> {
        self.status().await
    }
}

impl ActionApi for PrimaryBackend {
    async fn connect(&self, country: Option<&str>) -> Result<(), BackendError> {
        flag("connect", PrimaryBackend::connect(self, country).await?)
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        flag("disconnect", PrimaryBackend::disconnect(self).await?)
    }
}

impl ActionApi for SecondaryBackend {
    async fn connect(&self, country: Option<&str>) -> Result<(), BackendError> {
        SecondaryBackend::connect(self, country).await
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        SecondaryBackend::disconnect(self).await
    }
}

impl CatalogApi for SecondaryBackend {
    async fn fetch_catalog(&self) -> Result<CatalogReport, BackendError> {
        let reply = self.status().await?;
        Ok(CatalogReport {
            servers: reply.servers().to_vec(),
            running: reply.status.as_ref().map(|s| s.running),
        })
    }
}

/// Which backend receives connect/disconnect
#[derive(Clone)]
pub enum ActionRoute {
    Primary(PrimaryBackend),
    Secondary(SecondaryBackend),
}

impl ActionApi for ActionRoute {
    async fn connect(&self, country: Option<&str>) -> Result<(), BackendError> {
        match self {
            ActionRoute::Primary(primary) => ActionApi::connect(primary, country).await,
            ActionRoute::Secondary(secondary) => ActionApi::connect(secondary, country).await,
        }
    }

    async fn disconnect(&self) -> Result<(), BackendError> {
        match self {
            ActionRoute::Primary(primary) => ActionApi::disconnect(primary).await,
            ActionRoute::Secondary(secondary) => ActionApi::disconnect(secondary).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag() {
        assert!(flag("connect", true).is_ok());
        let err = flag("connect", false).unwrap_err();
        assert!(matches!(err, BackendError::Rejected(ref r) if r == "connect reported failure"));
    }
}
