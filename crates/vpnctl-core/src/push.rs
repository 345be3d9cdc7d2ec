//! Push channel listener
//!
//! Feeds `traffic` events into the [`MonitoringLoop`] and `status` events
//! into the [`StatusLog`]. The socket is re-opened after a fixed delay when
//! it drops; the listener never touches the connection state.

use crate::monitor::MonitoringLoop;
use crate::notice::StatusLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vpnctl_net::{PushClient, PushMessage};

/// Consumes the push channel
#[derive(Clone)]
pub struct PushListener {
    client: PushClient,
    monitor: Arc<MonitoringLoop>,
    log: Arc<StatusLog>,
    retry: Duration,
}

impl PushListener {
    pub fn new(
        client: PushClient,
        monitor: Arc<MonitoringLoop>,
        log: Arc<StatusLog>,
        retry: Duration,
    ) -> Self {
        Self {
            client,
            monitor,
            log,
            retry,
        }
    }

    /// Apply one message
    pub fn handle(&self, message: PushMessage) {
        match message {
            PushMessage::Traffic { size, speed } => self.monitor.record_traffic(size, speed),
            PushMessage::Status { message } => {
                debug!("Push status: {}", message);
                self.log.append(&message);
            }
        }
    }

    /// Listen until aborted, reconnecting after `retry`
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.client.connect().await {
                    Ok(mut stream) => {
                        while let Some(next) = stream.next().await {
                            match next {
                                Ok(message) => self.handle(message),
                                Err(e) => warn!("Push channel: {}", e),
                            }
                        }
                        info!("Push channel closed");
                    }
                    Err(e) => warn!("Push channel unavailable ({}): {}", self.client.url(), e),
                }
                tokio::time::sleep(self.retry).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorConfig;

    fn listener() -> (PushListener, Arc<MonitoringLoop>, Arc<StatusLog>) {
        let monitor = Arc::new(MonitoringLoop::new(MonitorConfig::default()));
        let log = Arc::new(StatusLog::new(10));
        let listener = PushListener::new(
            PushClient::new("ws://127.0.0.1:9/events"),
            monitor.clone(),
            log.clone(),
            Duration::from_secs(5),
        );
        (listener, monitor, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_event_feeds_monitor() {
        let (listener, monitor, _log) = listener();
        monitor.start();

        listener.handle(PushMessage::Traffic {
            size: 3.0 * 1024.0 * 1024.0,
            speed: 512.0 * 1024.0,
        });

        let telemetry = monitor.telemetry();
        assert_eq!(telemetry.transferred_label(), "3.00 MB");
        assert_eq!(telemetry.speed_label(), "0.50 MB/s");
    }

    #[tokio::test]
    async fn test_status_event_is_logged() {
        let (listener, _monitor, log) = listener();

        listener.handle(PushMessage::Status {
            message: "Handshake completed".to_string(),
        });

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with("] Handshake completed"));
        assert!(entries[0].starts_with('['));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_keeps_retrying() {
        let (listener, _monitor, log) = listener();
        let handle = listener.spawn();

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!handle.is_finished());
        assert!(log.entries().is_empty());
        handle.abort();
    }
}
