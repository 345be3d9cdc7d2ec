//! Display projection.
//!
//! [`DisplayModel`] is a pure function of the controller's components;
//! rendering it is left to a [`ViewSink`].

use crate::catalog::Selection;
use crate::error::Action;
use crate::monitor::Telemetry;
use crate::state::ConnectionState;
use vpnctl_net::ServerEntry;

/// Placeholder for fields the backend has not reported yet
pub const BLANK: &str = "-";

/// Everything the projection reads
pub struct ViewInputs<'a> {
    pub state: &'a ConnectionState,
    /// Store revision; 0 until the first snapshot arrives
    pub revision: u64,
    pub selection: &'a Selection,
    pub servers: &'a [ServerEntry],
    pub telemetry: &'a Telemetry,
    pub pending: Option<Action>,
    pub status_log: Vec<String>,
}

/// What the user sees
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayModel {
    pub connected: bool,
    pub status_text: String,
    pub connect_enabled: bool,
    pub disconnect_enabled: bool,
    pub mtu: String,
    pub port: String,
    pub network: String,
    /// Country shown in the selector; `None` when unset or indeterminate
    pub selected_country: Option<String>,
    pub selection_indeterminate: bool,
    /// Selector options in backend order
    pub countries: Vec<String>,
    pub traffic_percent: f64,
    pub traffic: String,
    pub elapsed: String,
    pub transferred: String,
    pub speed: String,
    pub status_log: Vec<String>,
}

impl DisplayModel {
    pub fn project(inputs: ViewInputs<'_>) -> Self {
        let state = inputs.state;
        let reported = inputs.revision > 0;
        let idle = inputs.pending.is_none();

        let field = |value: String| if reported { value } else { BLANK.to_string() };

        Self {
            connected: state.running,
            status_text: if state.running { "Connected" } else { "Disconnected" }.to_string(),
            connect_enabled: idle && !state.running,
            disconnect_enabled: idle && state.running,
            mtu: field(state.fingerprint.mtu.to_string()),
            port: field(state.port.to_string()),
            network: field(state.routing_table.vpn_network.clone()),
            selected_country: inputs.selection.country().map(str::to_string),
            selection_indeterminate: matches!(inputs.selection, Selection::Indeterminate(_)),
            countries: inputs.servers.iter().map(|s| s.country.clone()).collect(),
            traffic_percent: inputs.telemetry.utilization_percent,
            traffic: inputs.telemetry.traffic_label(),
            elapsed: inputs.telemetry.elapsed_label(),
            transferred: inputs.telemetry.transferred_label(),
            speed: inputs.telemetry.speed_label(),
            status_log: inputs.status_log,
        }
    }
}

/// Receives display updates
pub trait ViewSink {
    fn render(&self, model: &DisplayModel);
}
