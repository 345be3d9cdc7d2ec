//! User-facing notifications and the push-channel status log.

use crate::state::lock;
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A non-fatal message meant for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Local>,
}

/// Bounded history of notices plus a live feed for the view
pub struct Notifier {
    history: Mutex<VecDeque<Notice>>,
    capacity: usize,
    feed: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity.max(1));
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            feed,
        }
    }

    /// Record and broadcast a notice
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            at: Local::now(),
        };
        match level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Warning => warn!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }

        {
            let mut history = lock(&self.history);
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(notice.clone());
        }
        // No receivers is fine
        let _ = self.feed.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.feed.subscribe()
    }

    /// Notices in arrival order
    pub fn history(&self) -> Vec<Notice> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only status log fed by the push channel
pub struct StatusLog {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl StatusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Append `[HH:MM:SS] message` using local time
    pub fn append(&self, message: &str) {
        self.append_at(Local::now(), message);
    }

    pub fn append_at(&self, at: DateTime<Local>, message: &str) {
        let line = format!("[{}] {}", at.format("%H:%M:%S"), message);
        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(line);
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).iter().cloned().collect()
    }
}
