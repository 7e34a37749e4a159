//! Push notification handling
//!
//! A push payload becomes a notification with two actions: open the app or
//! dismiss. Clicking "open" asks the client registry for a new window.

use crate::config::schema::{AppConfig, NotificationConfig};
use crate::error::OfflineResult;
use crate::platform::{ClientRegistry, Notification, NotificationAction, NotificationData, Notifier};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Action that opens the application
pub const ACTION_OPEN: &str = "explore";
/// Action that dismisses the notification
pub const ACTION_CLOSE: &str = "close";
/// Key carried in every notification's data
pub const PRIMARY_KEY: u32 = 1;

/// What a notification click led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    OpenedWindow(String),
    Dismissed,
}

/// Builds notifications from push payloads and reacts to clicks
pub struct PushHandler {
    app: AppConfig,
    config: NotificationConfig,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn ClientRegistry>,
}

impl PushHandler {
    pub fn new(
        app: AppConfig,
        config: NotificationConfig,
        notifier: Arc<dyn Notifier>,
        clients: Arc<dyn ClientRegistry>,
    ) -> Self {
        Self {
            app,
            config,
            notifier,
            clients,
        }
    }

    /// Build the notification for a payload without showing it
    pub fn build(&self, payload: Option<&str>) -> Notification {
        let body = payload
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.default_body.clone());

        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: self.app.icon.clone(),
        };

        Notification {
            title: self.app.name.clone(),
            body,
            icon: self.app.icon.clone(),
            badge: self.app.icon.clone(),
            vibrate: self.config.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: Utc::now().timestamp_millis(),
                primary_key: PRIMARY_KEY,
            },
            actions: vec![
                action(ACTION_OPEN, &self.config.open_title),
                action(ACTION_CLOSE, &self.config.close_title),
            ],
        }
    }

    /// Show a notification for an incoming push
    pub async fn push(&self, payload: Option<&str>) -> OfflineResult<Notification> {
        info!("Push received");
        let notification = self.build(payload);
        self.notifier.show(notification.clone()).await?;
        Ok(notification)
    }

    /// React to a click. The notification is closed whatever the action;
    /// only the open action does anything further.
    pub async fn click(&self, action: Option<&str>) -> OfflineResult<ClickOutcome> {
        debug!("Notification clicked: {:?}", action);
        self.notifier.close(PRIMARY_KEY).await?;
        if action == Some(ACTION_OPEN) {
            self.clients.open_window(&self.app.start_url).await?;
            return Ok(ClickOutcome::OpenedWindow(self.app.start_url.clone()));
        }
        Ok(ClickOutcome::Dismissed)
    }
}
