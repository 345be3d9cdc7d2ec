//! Monitoring Loop
//!
//! Two repeating timers that run only while the tunnel is connected:
//!
//! - **Traffic sampler**: utilization percentage for the traffic bar
//! - **Elapsed clock**: `now - connected_at` as `HH:MM:SS`
//!
//! # Lifecycle
//!
//! ```text
//!            running: false -> true
//!   ┌──────┐ ──────────────────────▶ ┌───────────┐
//!   │ Idle │                         │ Connected │  (both timers live)
//!   └──────┘ ◀────────────────────── └───────────┘
//!            running: true -> false
//!            (timers cancelled, display reset)
//! ```
//!
//! The loop subscribes to the [`StateStore`](crate::StateStore) and reacts
//! only to `running` edges, so repeated "connected" snapshots never start a
//! second timer pair. Every start/stop bumps a generation counter; a tick
//! from an older generation never writes to the display, which rules out a
//! stray tick after teardown.

use crate::state::{ConnectionState, StateObserver, lock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Timer periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub sample_interval: Duration,
    pub clock_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            clock_interval: Duration::from_secs(1),
        }
    }
}

/// Produces the utilization shown on each sampler tick
pub trait TrafficSampler: Send + 'static {
    /// Utilization in `[0, 100)`
    fn sample(&mut self) -> f64;
}

/// Placeholder sampler producing uniformly random utilization
pub struct SyntheticSampler {
    rng: StdRng,
}

impl SyntheticSampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence, for tests and demos
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SyntheticSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficSampler for SyntheticSampler {
    fn sample(&mut self) -> f64 {
        self.rng.gen_range(0.0..100.0)
    }
}

/// One sampler reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficSample {
    pub timestamp: Instant,
    pub utilization_percent: f64,
}

/// Display-facing telemetry. All zero while idle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub utilization_percent: f64,
    pub elapsed: Duration,
    /// Cumulative bytes reported by the push channel
    pub bytes_transferred: f64,
    /// Last throughput reported by the push channel (bytes/s)
    pub speed: f64,
    pub last_sample: Option<TrafficSample>,
}

impl Telemetry {
    /// `"37%"`
    pub fn traffic_label(&self) -> String {
        format!("{}%", self.utilization_percent.round() as u32)
    }

    /// `"01:02:03"`
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed)
    }

    /// `"1.50 MB"`
    pub fn transferred_label(&self) -> String {
        format!("{:.2} MB", self.bytes_transferred / (1024.0 * 1024.0))
    }

    /// `"0.25 MB/s"`
    pub fn speed_label(&self) -> String {
        format!("{:.2} MB/s", self.speed / (1024.0 * 1024.0))
    }
}

/// Zero-padded `HH:MM:SS`; hours keep growing past 99.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

struct MonitorInner {
    generation: u64,
    connected_at: Option<Instant>,
    traffic: Option<JoinHandle<()>>,
    clock: Option<JoinHandle<()>>,
    telemetry: Telemetry,
    pairs_started: u64,
}

impl MonitorInner {
    fn cancel_timers(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.traffic.take() {
            handle.abort();
        }
        if let Some(handle) = self.clock.take() {
            handle.abort();
        }
    }

    fn timers_live(&self) -> bool {
        self.traffic.is_some() || self.clock.is_some()
    }
}

/// Owns the sampler and clock timers
pub struct MonitoringLoop {
    config: MonitorConfig,
    runtime: Handle,
    sampler: Arc<Mutex<Box<dyn TrafficSampler>>>,
    inner: Arc<Mutex<MonitorInner>>,
}

impl MonitoringLoop {
    /// Create an idle loop. Must be called from within a tokio runtime.
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_sampler(config, SyntheticSampler::new())
    }

    /// Create an idle loop with a custom sampler
    pub fn with_sampler(config: MonitorConfig, sampler: impl TrafficSampler) -> Self {
        Self {
            config,
            runtime: Handle::current(),
            sampler: Arc::new(Mutex::new(Box::new(sampler))),
            inner: Arc::new(Mutex::new(MonitorInner {
                generation: 0,
                connected_at: None,
                traffic: None,
                clock: None,
                telemetry: Telemetry::default(),
                pairs_started: 0,
            })),
        }
    }

    /// Enter `Connected`: capture `connected_at` and start both timers.
    ///
    /// No-op if the timers are already running.
    pub fn start(&self) {
        self.start_timers(true);
    }

    /// Cancel both timers but keep `connected_at` and the display, so a
    /// failed disconnect can [`resume`](Self::resume) where it left off.
    pub fn suspend(&self) {
        let mut inner = lock(&self.inner);
        if inner.timers_live() {
            inner.cancel_timers();
            debug!("Monitoring suspended");
        }
    }

    /// Restart timers after [`suspend`](Self::suspend), keeping `connected_at`
    pub fn resume(&self) {
        self.start_timers(false);
    }

    /// Enter `Idle`: cancel both timers and reset the display.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        let was_live = inner.timers_live() || inner.connected_at.is_some();
        inner.cancel_timers();
        inner.connected_at = None;
        inner.telemetry = Telemetry::default();
        if was_live {
            info!("Monitoring stopped");
        }
    }

    /// Bring timers in line with `state.running`
    pub fn sync(&self, state: &ConnectionState) {
        if state.running {
            self.resume();
        } else {
            self.stop();
        }
    }

    /// Account a push-channel traffic event. Ignored while idle.
    pub fn record_traffic(&self, size: f64, speed: f64) {
        let mut inner = lock(&self.inner);
        if inner.connected_at.is_none() {
            debug!("Ignoring traffic event while disconnected");
            return;
        }
        inner.telemetry.bytes_transferred += size.max(0.0);
        inner.telemetry.speed = speed.max(0.0);
    }

    /// Current display values
    pub fn telemetry(&self) -> Telemetry {
        lock(&self.inner).telemetry.clone()
    }

    /// Time since the tunnel came up, derived on demand
    pub fn elapsed(&self) -> Option<Duration> {
        lock(&self.inner).connected_at.map(|t| t.elapsed())
    }

    /// When the current connection was first observed
    pub fn connected_at(&self) -> Option<Instant> {
        lock(&self.inner).connected_at
    }

    /// Live timer tasks (0 or 2)
    pub fn active_timers(&self) -> usize {
        let inner = lock(&self.inner);
        [&inner.traffic, &inner.clock]
            .into_iter()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// How many timer pairs have ever been started
    pub fn pairs_started(&self) -> u64 {
        lock(&self.inner).pairs_started
    }

    fn start_timers(&self, fresh: bool) {
        let mut inner = lock(&self.inner);
        if inner.timers_live() {
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        if fresh || inner.connected_at.is_none() {
            inner.connected_at = Some(Instant::now());
            inner.telemetry = Telemetry::default();
        }
        inner.pairs_started += 1;

        inner.traffic = Some(self.spawn_sampler(generation));
        inner.clock = Some(self.spawn_clock(generation));
        info!("Monitoring started");
    }

    fn spawn_sampler(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let sampler = Arc::clone(&self.sampler);
        let period = self.config.sample_interval;

        self.runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let value = lock(&sampler).sample().clamp(0.0, 100.0 - f64::EPSILON);

                let mut guard = lock(&inner);
                if guard.generation != generation {
                    break;
                }
                guard.telemetry.utilization_percent = value;
                guard.telemetry.last_sample = Some(TrafficSample {
                    timestamp: Instant::now(),
                    utilization_percent: value,
                });
            }
        })
    }

    fn spawn_clock(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let period = self.config.clock_interval;

        self.runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let mut guard = lock(&inner);
                if guard.generation != generation {
                    break;
                }
                let Some(started) = guard.connected_at else {
                    break;
                };
                guard.telemetry.elapsed = started.elapsed();
            }
        })
    }
}

impl StateObserver for MonitoringLoop {
    fn on_state_change(&self, previous: &ConnectionState, current: &ConnectionState) {
        match (previous.running, current.running) {
            (false, true) => self.start(),
            (true, false) => self.stop(),
            _ => {}
        }
    }
}

impl Drop for MonitoringLoop {
    fn drop(&mut self) {
        lock(&self.inner).cancel_timers();
    }
}
