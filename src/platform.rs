//! Host platform collaborators
//!
//! The core never owns windows or notification surfaces. It asks the host to
//! claim clients, open a window and show a notification through these traits.

use crate::error::OfflineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Registry of client contexts (tabs, webviews) controlled by the worker
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Take control of every already-open client. Returns how many were claimed.
    async fn claim(&self) -> OfflineResult<usize>;

    /// Open a new client at `url` (relative to the app origin)
    async fn open_window(&self, url: &str) -> OfflineResult<()>;
}

/// User-actionable choice attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Opaque data carried with a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Arrival time, milliseconds since the Unix epoch
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

/// A notification ready to be shown by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// Platform notification surface
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, notification: Notification) -> OfflineResult<()>;

    /// Dismiss a shown notification, identified by its `primary_key`
    async fn close(&self, primary_key: u32) -> OfflineResult<()>;
}

/// Registry for hosts without client contexts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClients;

#[async_trait]
impl ClientRegistry for NoClients {
    async fn claim(&self) -> OfflineResult<usize> {
        Ok(0)
    }

    async fn open_window(&self, url: &str) -> OfflineResult<()> {
        tracing::debug!("No client registry, ignoring open_window({})", url);
        Ok(())
    }
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, notification: Notification) -> OfflineResult<()> {
        tracing::info!("Notification: {}: {}", notification.title, notification.body);
        Ok(())
    }

    async fn close(&self, primary_key: u32) -> OfflineResult<()> {
        tracing::debug!("Notification {} closed", primary_key);
        Ok(())
    }
}
