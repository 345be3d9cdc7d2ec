//! vpnctl Core
//!
//! State reconciliation and monitoring for a VPN tunnel whose lifecycle is
//! owned by an external service.
//!
//! Architecture:
//! 1. `StateStore` → the single client-side connection snapshot
//! 2. `StatusPoller` → periodic refresh from the primary backend
//! 3. `ActionDispatcher` → serialized connect/disconnect
//! 4. `MonitoringLoop` → traffic sampler + elapsed clock, alive only while connected
//! 5. `ServerCatalog` → exit countries and the current selection
//! 6. `Controller` → wires the above and projects a `DisplayModel`

mod backend;
mod catalog;
mod config;
mod controller;
mod dispatcher;
mod error;
mod monitor;
mod notice;
mod poller;
mod push;
mod state;
mod view;

#[cfg(test)]
mod testing;

pub use backend::{ActionApi, ActionRoute, CatalogApi, CatalogReport, StatusApi};
pub use catalog::{Selection, ServerCatalog};
pub use config::{
    ActionsConfig, ConfigError, ControllerConfig, PrimaryConfig, PushConfig, RouteKind,
    SecondaryConfig, TimingConfig,
};
pub use controller::{Controller, LiveController};
pub use dispatcher::{ActionDispatcher, DispatcherConfig};
pub use error::{Action, ActionError, PollError};
pub use monitor::{
    MonitorConfig, MonitoringLoop, SyntheticSampler, Telemetry, TrafficSample, TrafficSampler,
    format_elapsed,
};
pub use notice::{Notice, NoticeLevel, Notifier, StatusLog};
pub use poller::{PollerConfig, PollerHandle, StatusPoller};
pub use push::PushListener;
pub use state::{
    ApplyOutcome, ConnectionState, RequestId, StateObserver, StatePatch, StateStore, StateUpdate,
};
pub use view::{BLANK, DisplayModel, ViewInputs, ViewSink};

pub use vpnctl_net::{BackendError, HttpError, NodeRef, PushClient, ServerEntry};
