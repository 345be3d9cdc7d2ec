//! Action Dispatcher
//!
//! Runs user-triggered connect/disconnect requests.
//!
//! # Protocol
//!
//! 1. Claim the in-flight slot (a second dispatch is rejected with
//!    [`ActionError::Busy`], never interleaved)
//! 2. Send the request and wait for the backend's verdict
//! 3. **Success**: fence the store and refresh it from the primary backend,
//!    so the displayed state is the backend's, not the client's guess
//! 4. **Failure**: leave the store alone and raise a notification
//!
//! Disconnect cancels the monitoring timers before the request goes out;
//! they are resumed if the tunnel turns out to still be up.

use crate::backend::{ActionApi, CatalogApi, StatusApi};
use crate::catalog::ServerCatalog;
use crate::error::{Action, ActionError};
use crate::monitor::MonitoringLoop;
use crate::notice::{NoticeLevel, Notifier};
use crate::poller::StatusPoller;
use crate::state::{StateStore, lock};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Dispatcher behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherConfig {
    /// After a country change forces a disconnect, connect to the new
    /// country right away instead of waiting for a manual connect
    pub reconnect_on_country_change: bool,
}

/// Clears the in-flight slot when dropped
struct InFlight<'a> {
    slot: &'a Mutex<Option<Action>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

/// Serializes and executes connect/disconnect
pub struct ActionDispatcher<A, S, C> {
    actions: A,
    store: Arc<StateStore>,
    poller: Arc<StatusPoller<S, C>>,
    monitor: Arc<MonitoringLoop>,
    notifier: Arc<Notifier>,
    config: DispatcherConfig,
    in_flight: Mutex<Option<Action>>,
}

impl<A, S, C> ActionDispatcher<A, S, C>
where
    A: ActionApi,
    S: StatusApi,
    C: CatalogApi,
{
    pub fn new(
        actions: A,
        store: Arc<StateStore>,
        poller: Arc<StatusPoller<S, C>>,
        monitor: Arc<MonitoringLoop>,
        notifier: Arc<Notifier>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            actions,
            store,
            poller,
            monitor,
            notifier,
            config,
            in_flight: Mutex::new(None),
        }
    }

    fn catalog(&self) -> &ServerCatalog<C> {
        self.poller.catalog()
    }

    /// Action currently waiting on the backend, if any
    pub fn pending(&self) -> Option<Action> {
        *lock(&self.in_flight)
    }

    fn claim(&self, action: Action) -> Result<InFlight<'_>, ActionError> {
        let mut slot = lock(&self.in_flight);
        if let Some(pending) = *slot {
            debug!("Rejecting {} while {} is in flight", action, pending);
            return Err(ActionError::Busy { pending });
        }
        *slot = Some(action);
        Ok(InFlight {
            slot: &self.in_flight,
        })
    }

    /// Connect to `target`, or to the selected country when `None`
    pub async fn connect(&self, target: Option<&str>) -> Result<(), ActionError> {
        let _in_flight = self.claim(Action::Connect)?;
        self.connect_claimed(target).await
    }

    /// Disconnect the tunnel
    pub async fn disconnect(&self) -> Result<(), ActionError> {
        let _in_flight = self.claim(Action::Disconnect)?;
        self.disconnect_claimed().await
    }

    /// Change the exit country.
    ///
    /// While connected this disconnects first and records the new country
    /// only once the backend confirms the tunnel is down. Rejected with
    /// [`ActionError::Busy`] while another action is in flight.
    pub async fn select_country(&self, country: &str) -> Result<(), ActionError> {
        if let Some(pending) = self.pending() {
            debug!("Rejecting selection of {} while {} is in flight", country, pending);
            return Err(ActionError::Busy { pending });
        }
        let state = self.store.read();
        if !state.running {
            self.catalog().select(country);
            return Ok(());
        }
        if state.country() == Some(country) {
            self.catalog().select(country);
            return Ok(());
        }

        let _in_flight = self.claim(Action::Disconnect)?;
        info!(
            "Switching exit from {} to {}",
            state.country().unwrap_or("unknown"),
            country
        );
        self.disconnect_claimed().await?;
        if self.store.is_running() {
            let err = ActionError::StillConnected;
            self.notifier.notify(NoticeLevel::Warning, err.to_string());
            return Err(err);
        }
        self.catalog().select(country);

        if self.config.reconnect_on_country_change {
            *lock(&self.in_flight) = Some(Action::Connect);
            self.connect_claimed(Some(country)).await?;
        }
        Ok(())
    }

    async fn connect_claimed(&self, target: Option<&str>) -> Result<(), ActionError> {
        let country = target
            .map(str::to_string)
            .or_else(|| self.catalog().selected_country());
        info!("Connecting (exit: {})", country.as_deref().unwrap_or("backend default"));

        match self.actions.connect(country.as_deref()).await {
            Ok(()) => {
                self.confirm(Action::Connect).await;
                Ok(())
            }
            Err(e) => Err(self.fail(Action::Connect, e)),
        }
    }

    async fn disconnect_claimed(&self) -> Result<(), ActionError> {
        info!("Disconnecting");
        // Timers go before the request so no tick lands after teardown
        self.monitor.suspend();

        let result = match self.actions.disconnect().await {
            Ok(()) => {
                self.confirm(Action::Disconnect).await;
                Ok(())
            }
            Err(e) => Err(self.fail(Action::Disconnect, e)),
        };

        self.store.with_state(|state| self.monitor.sync(state));
        result
    }

    async fn confirm(&self, action: Action) {
        debug!("Backend confirmed {}", action);
        self.store.fence();
        if let Err(e) = self.poller.poll_once().await {
            warn!("Refresh after {} failed: {}", action, e);
        }
    }

    fn fail(&self, action: Action, err: vpnctl_net::BackendError) -> ActionError {
        let err = ActionError::from_backend(action, err);
        self.notifier.notify(NoticeLevel::Error, err.to_string());
        err
    }
}
