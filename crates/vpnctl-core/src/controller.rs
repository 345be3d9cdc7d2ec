//! Controller
//!
//! Owns one instance of every component and wires them up:
//!
//! ```text
//! ActionDispatcher ──┐
//!                    ├──▶ StateStore ──▶ MonitoringLoop (timers)
//! StatusPoller ──────┘         └───────▶ ServerCatalog (selector)
//! PushListener ──▶ MonitoringLoop / StatusLog
//! ```
//!
//! The view never talks to a component directly: it reads a
//! [`DisplayModel`] and calls the action methods here.

use crate::backend::{ActionApi, ActionRoute, CatalogApi, StatusApi};
use crate::catalog::{Selection, ServerCatalog};
use crate::config::{ConfigError, ControllerConfig, RouteKind};
use crate::dispatcher::ActionDispatcher;
use crate::error::{Action, ActionError};
use crate::monitor::{MonitoringLoop, Telemetry};
use crate::notice::{Notifier, StatusLog};
use crate::poller::{PollerHandle, StatusPoller};
use crate::push::PushListener;
use crate::state::{ConnectionState, StateStore, lock};
use crate::view::{DisplayModel, ViewInputs, ViewSink};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vpnctl_net::{
    HttpClient, HttpClientConfig, PrimaryBackend, PushClient, SecondaryBackend, ServerEntry,
};

/// Notices kept for the view
const NOTICE_CAPACITY: usize = 32;

/// Controller wired to the HTTP backends
pub type LiveController = Controller<PrimaryBackend, ActionRoute, SecondaryBackend>;

/// The assembled VPN controller
pub struct Controller<S, A, C> {
    store: Arc<StateStore>,
    catalog: Arc<ServerCatalog<C>>,
    monitor: Arc<MonitoringLoop>,
    poller: Arc<StatusPoller<S, C>>,
    dispatcher: ActionDispatcher<A, S, C>,
    notifier: Arc<Notifier>,
    status_log: Arc<StatusLog>,
    push: Option<PushListener>,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    poller: Option<PollerHandle>,
    push: Option<JoinHandle<()>>,
}

impl<S, A, C> Controller<S, A, C>
where
    S: StatusApi,
    A: ActionApi,
    C: CatalogApi,
{
    /// Assemble the components. Must be called from within a tokio runtime.
    pub fn new(status: S, actions: A, catalog: Option<C>, config: &ControllerConfig) -> Self {
        let store = Arc::new(StateStore::new());
        let catalog = Arc::new(ServerCatalog::new(catalog));
        let monitor = Arc::new(MonitoringLoop::new(config.timing.monitor()));
        let notifier = Arc::new(Notifier::new(NOTICE_CAPACITY));
        let status_log = Arc::new(StatusLog::new(config.status_log_capacity));

        store.subscribe(monitor.clone());
        store.subscribe(catalog.clone());

        let poller = Arc::new(StatusPoller::new(
            status,
            store.clone(),
            catalog.clone(),
            config.timing.poller(),
        ));
        let dispatcher = ActionDispatcher::new(
            actions,
            store.clone(),
            poller.clone(),
            monitor.clone(),
            notifier.clone(),
            config.actions.dispatcher(),
        );

        Self {
            store,
            catalog,
            monitor,
            poller,
            dispatcher,
            notifier,
            status_log,
            push: None,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Attach a push channel, opened on [`start`](Self::start)
    pub fn with_push(mut self, client: PushClient, retry: Duration) -> Self {
        self.push = Some(PushListener::new(
            client,
            self.monitor.clone(),
            self.status_log.clone(),
            retry,
        ));
        self
    }

    /// Start polling and, if configured, the push channel.
    ///
    /// May be called again after [`shutdown`](Self::shutdown).
    pub fn start(&self) {
        let mut tasks = lock(&self.tasks);
        if tasks.poller.is_some() {
            debug!("Controller already started");
            return;
        }
        // After a shutdown the store may still say connected; no edge will come
        self.store.with_state(|state| self.monitor.sync(state));

        tasks.poller = Some(self.poller.spawn());
        if let Some(ref listener) = self.push {
            tasks.push = Some(listener.clone().spawn());
        }
        info!(
            "Controller started (catalog: {})",
            if self.catalog.is_configured() { "on" } else { "off" }
        );
    }

    /// Stop every background task and reset the monitoring display
    pub fn shutdown(&self) {
        let mut tasks = lock(&self.tasks);
        if let Some(poller) = tasks.poller.take() {
            poller.stop();
        }
        if let Some(push) = tasks.push.take() {
            push.abort();
        }
        drop(tasks);

        self.monitor.stop();
        info!("Controller stopped");
    }

    pub async fn connect(&self, country: Option<&str>) -> Result<(), ActionError> {
        self.dispatcher.connect(country).await
    }

    pub async fn disconnect(&self) -> Result<(), ActionError> {
        self.dispatcher.disconnect().await
    }

    pub async fn select_country(&self, country: &str) -> Result<(), ActionError> {
        self.dispatcher.select_country(country).await
    }

    /// Poll the primary backend now
    pub async fn refresh(&self) {
        if let Err(e) = self.poller.poll_once().await {
            warn!("{}", e);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.store.read()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<MonitoringLoop> {
        &self.monitor
    }

    pub fn catalog(&self) -> &Arc<ServerCatalog<C>> {
        &self.catalog
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn status_log(&self) -> &Arc<StatusLog> {
        &self.status_log
    }

    pub fn pending(&self) -> Option<Action> {
        self.dispatcher.pending()
    }

    pub fn telemetry(&self) -> Telemetry {
        self.monitor.telemetry()
    }

    /// Project the current state for the view
    pub fn display(&self) -> DisplayModel {
        let state = self.store.read();
        let selection: Selection = self.catalog.selection();
        let servers: Vec<ServerEntry> = self.catalog.snapshot();
        let telemetry = self.monitor.telemetry();

        DisplayModel::project(ViewInputs {
            state: &state,
            revision: self.store.revision(),
            selection: &selection,
            servers: &servers,
            telemetry: &telemetry,
            pending: self.dispatcher.pending(),
            status_log: self.status_log.entries(),
        })
    }

    pub fn render(&self, sink: &impl ViewSink) {
        sink.render(&self.display());
    }
}

impl<S, A, C> Drop for Controller<S, A, C> {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(poller) = tasks.poller.take() {
            poller.stop();
        }
        if let Some(push) = tasks.push.take() {
            push.abort();
        }
    }
}

impl LiveController {
    /// Build a controller talking to the configured HTTP backends
    pub fn from_config(config: &ControllerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let client = Arc::new(HttpClient::new(HttpClientConfig {
            timeout: config.timing.request_timeout(),
            connect_timeout: config.timing.connect_timeout(),
            ..HttpClientConfig::default()
        }));

        let primary = PrimaryBackend::new(client.clone(), &config.primary.base_url).map_err(|e| {
            ConfigError::InvalidUrl {
                field: "primary.base_url",
                reason: e.to_string(),
            }
        })?;
        let secondary = config
            .secondary
            .as_ref()
            .map(|s| SecondaryBackend::new(client.clone(), &s.url))
            .transpose()
            .map_err(|e| ConfigError::InvalidUrl {
                field: "secondary.url",
                reason: e.to_string(),
            })?;

        let route = match (config.actions.route, secondary.as_ref()) {
            (RouteKind::Secondary, Some(secondary)) => ActionRoute::Secondary(secondary.clone()),
            (RouteKind::Secondary, None) => return Err(ConfigError::MissingSecondary),
            (RouteKind::Primary, _) => ActionRoute::Primary(primary.clone()),
        };

        let controller = Controller::new(primary, route, secondary, config);
        Ok(match config.push {
            Some(ref push) => controller.with_push(
                PushClient::new(push.url.clone()).with_timeout(config.timing.request_timeout()),
                Duration::from_secs(push.retry_secs),
            ),
            None => controller,
        })
    }
}
