//! Last-known stream metadata and health.

use crate::types::{StreamHealth, StreamInfo, Timestamp};
use parking_lot::RwLock;

/// A cached value and when it was fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub fetched_at: Timestamp,
}

/// Holds the most recent successful info and health fetches.
#[derive(Debug, Default)]
pub struct StatusCache {
    info: RwLock<Option<Cached<StreamInfo>>>,
    health: RwLock<Option<Cached<StreamHealth>>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_info(&self, info: StreamInfo) {
        *self.info.write() = Some(Cached {
            value: info,
            fetched_at: Timestamp::now(),
        });
    }

    pub fn record_health(&self, health: StreamHealth) {
        *self.health.write() = Some(Cached {
            value: health,
            fetched_at: Timestamp::now(),
        });
    }

    pub fn info(&self) -> Option<StreamInfo> {
        self.info.read().as_ref().map(|c| c.value.clone())
    }

    pub fn health(&self) -> Option<StreamHealth> {
        self.health.read().as_ref().map(|c| c.value.clone())
    }

    pub fn info_entry(&self) -> Option<Cached<StreamInfo>> {
        self.info.read().clone()
    }

    pub fn health_entry(&self) -> Option<Cached<StreamHealth>> {
        self.health.read().clone()
    }

    /// False until a health check has succeeded and reported healthy.
    pub fn is_healthy(&self) -> bool {
        self.health
            .read()
            .as_ref()
            .map(|c| c.value.healthy)
            .unwrap_or(false)
    }
}
