//! Exit-country catalog and the current selection.

use crate::backend::CatalogApi;
use crate::error::PollError;
use crate::state::{ConnectionState, StateObserver, lock};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use vpnctl_net::{NodeRef, ServerEntry};

/// Value of the country selector
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Nothing chosen yet
    #[default]
    Unset,
    /// A country present in the catalog (or the catalog is not loaded yet)
    Selected(String),
    /// The country is not in the latest catalog
    Indeterminate(String),
}

impl Selection {
    /// Country the selector points at, if it is usable
    pub fn country(&self) -> Option<&str> {
        match self {
            Selection::Selected(country) => Some(country.as_str()),
            Selection::Unset | Selection::Indeterminate(_) => None,
        }
    }
}

struct CatalogInner {
    servers: Vec<ServerEntry>,
    selection: Selection,
    refreshed: bool,
}

impl CatalogInner {
    fn classify(&self, country: &str) -> Selection {
        if !self.refreshed || self.servers.iter().any(|s| s.country == country) {
            Selection::Selected(country.to_string())
        } else {
            Selection::Indeterminate(country.to_string())
        }
    }
}

/// Cached catalog, refreshed from the secondary backend
pub struct ServerCatalog<C> {
    source: Option<C>,
    inner: Mutex<CatalogInner>,
}

impl<C: CatalogApi> ServerCatalog<C> {
    /// `source` is `None` when no secondary backend is configured
    pub fn new(source: Option<C>) -> Self {
        Self {
            source,
            inner: Mutex::new(CatalogInner {
                servers: Vec::new(),
                selection: Selection::Unset,
                refreshed: false,
            }),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    /// Fetch the catalog. On failure the last snapshot is kept.
    ///
    /// Returns the new entries together with the backend's own `running`
    /// flag, if it sent one.
    pub async fn refresh(&self) -> Result<(Vec<ServerEntry>, Option<bool>), PollError> {
        let source = self.source.as_ref().ok_or(PollError::NoCatalog)?;
        let report = source.fetch_catalog().await.map_err(PollError::Catalog)?;

        let mut inner = lock(&self.inner);
        if inner.servers != report.servers {
            info!("Server catalog updated ({} countries)", report.servers.len());
        }
        inner.servers = report.servers.clone();
        inner.refreshed = true;
        if let Selection::Selected(country) | Selection::Indeterminate(country) =
            inner.selection.clone()
        {
            inner.selection = inner.classify(&country);
        }
        Ok((report.servers, report.running))
    }

    /// Entries in backend order
    pub fn snapshot(&self) -> Vec<ServerEntry> {
        lock(&self.inner).servers.clone()
    }

    /// Whether at least one refresh succeeded
    pub fn is_populated(&self) -> bool {
        lock(&self.inner).refreshed
    }

    pub fn selection(&self) -> Selection {
        lock(&self.inner).selection.clone()
    }

    /// Country to connect to when the caller does not name one
    pub fn selected_country(&self) -> Option<String> {
        self.selection().country().map(str::to_string)
    }

    /// Point the selector at `country`
    pub fn select(&self, country: &str) -> Selection {
        let mut inner = lock(&self.inner);
        inner.selection = inner.classify(country);
        if let Selection::Indeterminate(_) = inner.selection {
            warn!("Selected country {} is not in the catalog", country);
        }
        inner.selection.clone()
    }

    /// Check the active node against the latest catalog.
    ///
    /// An unknown country marks the selection indeterminate instead of failing.
    pub fn revalidate(&self, current: Option<&NodeRef>) -> Selection {
        let mut inner = lock(&self.inner);
        if let Some(node) = current {
            inner.selection = inner.classify(&node.country);
            if let Selection::Indeterminate(ref country) = inner.selection {
                warn!("Active node {} missing from server catalog", country);
            }
        }
        inner.selection.clone()
    }
}

impl<C: CatalogApi> StateObserver for ServerCatalog<C> {
    fn on_state_change(&self, _previous: &ConnectionState, current: &ConnectionState) {
        // Follow the active node while connected; while idle keep the user's pick
        // unless there is none yet.
        let Some(node) = current.current_node.as_ref() else {
            return;
        };
        let adopt = current.running || self.selection() == Selection::Unset;
        if adopt {
            debug!("Selector follows active node {}", node.country);
            self.revalidate(Some(node));
        }
    }
}
