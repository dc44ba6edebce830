//! Delivery layer — the transport seam between the engines and the outside
//! world.
//!
//! Everything that leaves the process goes through [`DeliveryAdapter`]
//! (channel posts) or [`Notifier`] (owner notifications). Both the workflow
//! engine and the dispatch loop depend on the traits only, so tests swap in
//! an in-memory adapter and the whole system runs without a network.

pub mod telegram;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::model::{MediaAttachment, Post, ScheduledItem};

pub use telegram::TelegramAdapter;

/// What a destination looked like when we resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    /// Canonical destination id to store and deliver to.
    pub destination_id: String,
    /// Human-readable name for prompts and logs.
    pub display_name: String,
}

/// The payload of one delivery: text plus optional media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryContent {
    pub text: String,
    pub media: Option<MediaAttachment>,
}

impl DeliveryContent {
    /// Render a post for delivery. The title, when present, becomes a bold
    /// first line.
    pub fn from_post(post: &Post) -> Self {
        let text = match post.title.as_deref() {
            Some(title) if !title.is_empty() => format!("*{title}*\n\n{}", post.content),
            _ => post.content.clone(),
        };
        Self {
            text,
            media: post.media.clone(),
        }
    }

    /// Render a scheduled item's snapshot for delivery.
    pub fn from_scheduled(item: &ScheduledItem) -> Self {
        Self {
            text: item.content.clone(),
            media: item.media.clone(),
        }
    }
}

/// Outbound transport for channel posts.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    /// Validate a user-supplied destination identifier and resolve it to a
    /// canonical id plus display name. Fails when the destination does not
    /// exist or we cannot post to it.
    async fn resolve_destination(
        &self,
        identifier: &str,
    ) -> Result<ResolvedDestination, DeliveryError>;

    /// Deliver content to a destination.
    async fn deliver(
        &self,
        destination_id: &str,
        content: &DeliveryContent,
    ) -> Result<(), DeliveryError>;
}

/// Best-effort owner notifications ("your scheduled post went out").
///
/// Implementations log failures instead of surfacing them; a lost
/// notification must never affect delivery bookkeeping.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_owner(&self, owner_id: i64, text: &str);
}

/// A notifier that drops everything. Used when notifications are disabled
/// and in dispatch tests that don't care about them.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_owner(&self, _owner_id: i64, _text: &str) {}
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory adapter for unit tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// Records deliveries and fails on demand per destination.
    #[derive(Default)]
    pub struct MockAdapter {
        pub deliveries: Mutex<Vec<(String, DeliveryContent)>>,
        pub failing: Mutex<HashSet<String>>,
        pub unresolvable: Mutex<HashSet<String>>,
    }

    impl MockAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_destination(&self, destination_id: &str) {
            self.failing.lock().unwrap().insert(destination_id.to_string());
        }

        pub fn refuse_resolution(&self, identifier: &str) {
            self.unresolvable
                .lock()
                .unwrap()
                .insert(identifier.to_string());
        }

        pub fn delivered_to(&self) -> Vec<String> {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .map(|(dest, _)| dest.clone())
                .collect()
        }

        pub fn delivery_count(&self) -> usize {
            self.deliveries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeliveryAdapter for MockAdapter {
        async fn resolve_destination(
            &self,
            identifier: &str,
        ) -> Result<ResolvedDestination, DeliveryError> {
            if self.unresolvable.lock().unwrap().contains(identifier) {
                return Err(DeliveryError::Resolve {
                    identifier: identifier.to_string(),
                    reason: "unknown destination".to_string(),
                });
            }
            Ok(ResolvedDestination {
                destination_id: identifier.to_string(),
                display_name: identifier.trim_start_matches('@').to_string(),
            })
        }

        async fn deliver(
            &self,
            destination_id: &str,
            content: &DeliveryContent,
        ) -> Result<(), DeliveryError> {
            if self.failing.lock().unwrap().contains(destination_id) {
                return Err(DeliveryError::Send {
                    destination: destination_id.to_string(),
                    reason: "mock failure".to_string(),
                });
            }
            self.deliveries
                .lock()
                .unwrap()
                .push((destination_id.to_string(), content.clone()));
            Ok(())
        }
    }

    /// Collects owner notifications for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_owner(&self, owner_id: i64, text: &str) {
            self.sent.lock().unwrap().push((owner_id, text.to_string()));
        }
    }
}
