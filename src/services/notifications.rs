//! User-facing notifications
//!
//! Notifications are logged and broadcast to any subscriber. Nothing is
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

pub const NOTIFICATION_TITLE: &str = "Put.io";

/// A single user notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Notification service configuration
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    /// Broadcast channel capacity
    pub channel_capacity: usize,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Fan-out of user notifications
#[derive(Clone)]
pub struct NotificationService {
    event_tx: broadcast::Sender<Notification>,
}

impl NotificationService {
    pub fn new(config: NotificationServiceConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.channel_capacity);
        Self { event_tx }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(NotificationServiceConfig::default())
    }

    /// Subscribe to notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.event_tx.subscribe()
    }

    /// Publish a notification
    pub fn create(&self, title: &str, message: String) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            title: title.to_string(),
            message,
            created_at: Utc::now(),
        };

        info!(title = %notification.title, message = %notification.message, "Notification");

        if self.event_tx.send(notification.clone()).is_err() {
            debug!("No notification subscribers");
        }

        notification
    }

    /// Announce a file that landed in the library
    pub fn file_downloaded(&self, filename: &str) -> Notification {
        self.create(NOTIFICATION_TITLE, format!("{} has been downloaded", filename))
    }
}
