//! Notification sinks
//!
//! `send_notify` actions name a channel; the [`NotifierRegistry`] maps the
//! channel to a [`NotificationSink`]. Channels with no sink of their own go
//! to the fallback sink, which by default only logs.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Notification delivery failure
#[derive(Debug, Clone, Error)]
#[error("notification on channel {channel} failed: {reason}")]
pub struct NotifyError {
    pub channel: String,
    pub reason: String,
}

impl NotifyError {
    pub fn new(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// A message handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub message: String,
    /// Sanitized context of the cycle that sent it
    pub context: Value,
}

/// Delivers notifications for one or more channels
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Sink that writes the notification to the diagnostics log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            channel = %notification.channel,
            message = %notification.message,
            "NOTIFY"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Channel → sink routing
pub struct NotifierRegistry {
    sinks: DashMap<String, Arc<dyn NotificationSink>>,
    fallback: Arc<dyn NotificationSink>,
}

impl NotifierRegistry {
    /// Registry whose unclaimed channels go to [`LogNotifier`]
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(LogNotifier))
    }

    pub fn with_fallback(fallback: Arc<dyn NotificationSink>) -> Self {
        Self {
            sinks: DashMap::new(),
            fallback,
        }
    }

    /// Route a channel to a sink, replacing any previous one
    pub fn register(&self, channel: impl Into<String>, sink: Arc<dyn NotificationSink>) {
        let channel = channel.into();
        debug!(channel = %channel, sink = sink.name(), "Registering notification sink");
        self.sinks.insert(channel, sink);
    }

    pub fn unregister(&self, channel: &str) -> bool {
        self.sinks.remove(channel).is_some()
    }

    /// Sink for a channel, or the fallback
    pub fn sink_for(&self, channel: &str) -> Arc<dyn NotificationSink> {
        self.sinks
            .get(channel)
            .map(|s| Arc::clone(s.value()))
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Channels with a dedicated sink, sorted
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = self.sinks.iter().map(|s| s.key().clone()).collect();
        channels.sort();
        channels
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        // Clone out of the map so no shard lock is held across the await
        let sink = self.sink_for(&notification.channel);
        sink.send(notification).await
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationSink for Recording {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationSink for Broken {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::new(&notification.channel, "gateway down"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn note(channel: &str) -> Notification {
        Notification {
            channel: channel.to_string(),
            message: "High temp!".to_string(),
            context: json!({}),
        }
    }

    #[tokio::test]
    async fn test_routes_by_channel() {
        let registry = NotifierRegistry::new();
        let sms = Arc::new(Recording::default());
        registry.register("sms", sms.clone());

        registry.send(&note("sms")).await.unwrap();
        // No sink for email: handled by the logging fallback
        registry.send(&note("email")).await.unwrap();

        assert_eq!(sms.sent.lock().unwrap().len(), 1);
        assert_eq!(registry.channels(), vec!["sms"]);
        assert_eq!(registry.sink_for("email").name(), "log");
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let registry = NotifierRegistry::new();
        registry.register("pager", Arc::new(Broken));

        let err = registry.send(&note("pager")).await.unwrap_err();
        assert_eq!(err.channel, "pager");
        assert!(err.to_string().contains("gateway down"));
    }

    #[test]
    fn test_custom_fallback() {
        let fallback = Arc::new(Recording::default());
        let registry = NotifierRegistry::with_fallback(fallback.clone());

        tokio_test::block_on(registry.send(&note("anything"))).unwrap();
        assert_eq!(fallback.sent.lock().unwrap()[0].channel, "anything");
        assert!(!registry.unregister("anything"));
    }
}
