//! One-shot operations — single-trigger actions outside the multi-step
//! flows: publish-now, deletions, listings, settings toggles, and the
//! audit-log views.
//!
//! Acting on something that does not exist or belongs to another user is
//! reported as not-found (or silently ignored for deletes), never as an
//! internal error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::delivery::{DeliveryAdapter, DeliveryContent};
use crate::error::Result;
use crate::model::{
    Channel, EventKind, EventLogEntry, Post, ScheduledItem, SettingsValue, UserSettings,
};
use crate::store::Repository;

/// Outcome of an immediate publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Delivered { destination_name: String },
    PostNotFound,
    ChannelNotFound,
    Failed {
        destination_name: String,
        error: String,
    },
}

/// One-shot operation façade over the repository and delivery adapter.
pub struct Ops {
    repo: Arc<dyn Repository>,
    adapter: Arc<dyn DeliveryAdapter>,
    /// How many entries the event-log view returns.
    event_log_limit: usize,
}

impl Ops {
    pub fn new(
        repo: Arc<dyn Repository>,
        adapter: Arc<dyn DeliveryAdapter>,
        event_log_limit: usize,
    ) -> Self {
        Self {
            repo,
            adapter,
            event_log_limit,
        }
    }

    /// First contact: make sure the settings row exists and log it.
    pub async fn register_user(&self, owner_id: i64) -> Result<UserSettings> {
        let settings = self.repo.get_settings(owner_id).await?;
        self.repo
            .log_event(owner_id, EventKind::Start, "User started", None, None)
            .await?;
        info!(owner_id, "User registered");
        Ok(settings)
    }

    /// Deliver a post to one registered channel right now.
    ///
    /// Success is recorded as a `post_published` event; the post itself stays
    /// a draft, the event log is the delivery history.
    pub async fn publish_now(
        &self,
        owner_id: i64,
        post_id: i64,
        destination_id: &str,
    ) -> Result<PublishResult> {
        let post = self.repo.get_post(post_id).await?;
        let Some(post) = post.filter(|p| p.owner_id == owner_id) else {
            return Ok(PublishResult::PostNotFound);
        };

        let Some(channel) = self.repo.get_channel(owner_id, destination_id).await? else {
            return Ok(PublishResult::ChannelNotFound);
        };

        let content = DeliveryContent::from_post(&post);
        match self.adapter.deliver(&channel.destination_id, &content).await {
            Ok(()) => {
                self.repo
                    .log_event(
                        owner_id,
                        EventKind::PostPublished,
                        &format!(
                            "Post '{}' published to {}",
                            post.title_or_untitled(),
                            channel.display_name
                        ),
                        Some(&channel.destination_id),
                        Some(post.id),
                    )
                    .await?;
                info!(owner_id, post_id, destination_id = %channel.destination_id, "Post published");
                Ok(PublishResult::Delivered {
                    destination_name: channel.display_name,
                })
            }
            Err(e) => {
                warn!(owner_id, post_id, destination_id = %channel.destination_id, "Publish failed: {e}");
                Ok(PublishResult::Failed {
                    destination_name: channel.display_name,
                    error: e.to_string(),
                })
            }
        }
    }

    // ── Deletions ───────────────────────────────────────────────────

    /// Delete a post the owner has. Returns whether it existed.
    pub async fn delete_post(&self, owner_id: i64, post_id: i64) -> Result<bool> {
        let post = self.repo.get_post(post_id).await?;
        let Some(post) = post.filter(|p| p.owner_id == owner_id) else {
            return Ok(false);
        };

        self.repo.delete_post(post_id, owner_id).await?;
        self.repo
            .log_event(
                owner_id,
                EventKind::PostDeleted,
                &format!("Post '{}' deleted", post.title_or_untitled()),
                None,
                Some(post_id),
            )
            .await?;
        Ok(true)
    }

    /// Unregister a channel. Pending scheduled items to it are untouched.
    pub async fn delete_channel(&self, owner_id: i64, destination_id: &str) -> Result<()> {
        self.repo.delete_channel(owner_id, destination_id).await?;
        Ok(())
    }

    /// Remove a still-pending scheduled item. Returns whether it was pending
    /// and owned by the caller.
    pub async fn delete_scheduled_item(&self, owner_id: i64, item_id: i64) -> Result<bool> {
        let pending = self.repo.list_scheduled(owner_id).await?;
        let Some(item) = pending.iter().find(|i| i.id == item_id) else {
            return Ok(false);
        };

        self.repo.delete_scheduled(item_id, owner_id).await?;
        self.repo
            .log_event(
                owner_id,
                EventKind::ScheduledDeleted,
                &format!(
                    "Scheduled delivery for {} to {} removed",
                    item.due_at, item.destination_name
                ),
                Some(&item.destination_id),
                item.post_id,
            )
            .await?;
        Ok(true)
    }

    // ── Listings ────────────────────────────────────────────────────

    pub async fn list_posts(&self, owner_id: i64) -> Result<Vec<Post>> {
        Ok(self.repo.list_posts(owner_id).await?)
    }

    pub async fn list_channels(&self, owner_id: i64) -> Result<Vec<Channel>> {
        Ok(self.repo.list_channels(owner_id).await?)
    }

    pub async fn list_scheduled(&self, owner_id: i64) -> Result<Vec<ScheduledItem>> {
        Ok(self.repo.list_scheduled(owner_id).await?)
    }

    // ── Audit log ───────────────────────────────────────────────────

    /// Most recent events first, capped at the configured limit.
    pub async fn event_log(&self, owner_id: i64) -> Result<Vec<EventLogEntry>> {
        Ok(self.repo.list_events(owner_id, self.event_log_limit).await?)
    }

    pub async fn clear_event_log(&self, owner_id: i64) -> Result<()> {
        self.repo.clear_events(owner_id).await?;
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────────

    pub async fn settings(&self, owner_id: i64) -> Result<UserSettings> {
        Ok(self.repo.get_settings(owner_id).await?)
    }

    /// Flip the notifications switch, returning the new value.
    pub async fn toggle_notifications(&self, owner_id: i64) -> Result<bool> {
        let settings = self.repo.get_settings(owner_id).await?;
        let enabled = !settings.notifications_enabled;
        self.repo
            .update_setting(owner_id, SettingsValue::Notifications(enabled))
            .await?;
        self.repo
            .log_event(
                owner_id,
                EventKind::SettingsChanged,
                &format!(
                    "Notifications {}",
                    if enabled { "enabled" } else { "disabled" }
                ),
                None,
                None,
            )
            .await?;
        Ok(enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::testing::MockAdapter;
    use crate::model::{DueTime, NewScheduledItem};
    use crate::store::LibSqlBackend;

    async fn setup() -> (Ops, Arc<LibSqlBackend>, Arc<MockAdapter>) {
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let adapter = Arc::new(MockAdapter::new());
        let ops = Ops::new(repo.clone(), adapter.clone(), 30);
        (ops, repo, adapter)
    }

    #[tokio::test]
    async fn register_user_creates_settings_and_logs_start() {
        let (ops, repo, _) = setup().await;

        let settings = ops.register_user(7).await.unwrap();
        assert_eq!(settings.timezone, "UTC");

        let events = repo.list_events(7, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Start);
    }

    #[tokio::test]
    async fn publish_now_delivers_and_keeps_post_a_draft() {
        let (ops, repo, adapter) = setup().await;
        repo.add_channel(1, "@news", "News").await.unwrap();
        let post_id = repo
            .insert_post(1, Some("Hi"), "Body", None)
            .await
            .unwrap();

        let result = ops.publish_now(1, post_id, "@news").await.unwrap();
        assert_eq!(
            result,
            PublishResult::Delivered {
                destination_name: "News".into()
            }
        );
        assert_eq!(adapter.delivered_to(), vec!["@news"]);

        // Event log records the publish; the post's own status does not move
        let events = repo.list_events(1, 10).await.unwrap();
        assert_eq!(events[0].kind, EventKind::PostPublished);
        let post = repo.get_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.status, crate::model::PostStatus::Draft);
    }

    #[tokio::test]
    async fn publish_now_reports_missing_targets() {
        let (ops, repo, _) = setup().await;
        repo.add_channel(1, "@news", "News").await.unwrap();
        let post_id = repo.insert_post(1, None, "Body", None).await.unwrap();
        let foreign_post = repo.insert_post(2, None, "Other", None).await.unwrap();

        assert_eq!(
            ops.publish_now(1, 999, "@news").await.unwrap(),
            PublishResult::PostNotFound
        );
        assert_eq!(
            ops.publish_now(1, foreign_post, "@news").await.unwrap(),
            PublishResult::PostNotFound
        );
        assert_eq!(
            ops.publish_now(1, post_id, "@ghost").await.unwrap(),
            PublishResult::ChannelNotFound
        );
    }

    #[tokio::test]
    async fn publish_failure_is_reported_without_an_event() {
        let (ops, repo, adapter) = setup().await;
        repo.add_channel(1, "@news", "News").await.unwrap();
        adapter.fail_destination("@news");
        let post_id = repo.insert_post(1, None, "Body", None).await.unwrap();

        let result = ops.publish_now(1, post_id, "@news").await.unwrap();
        let PublishResult::Failed {
            destination_name,
            error,
        } = result
        else {
            panic!("expected Failed, got {result:?}");
        };
        assert_eq!(destination_name, "News");
        assert!(error.contains("mock failure"));
        assert!(repo.list_events(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_post_is_owner_scoped() {
        let (ops, repo, _) = setup().await;
        let mine = repo.insert_post(1, None, "a", None).await.unwrap();
        let theirs = repo.insert_post(2, None, "b", None).await.unwrap();

        assert!(ops.delete_post(1, mine).await.unwrap());
        assert!(!ops.delete_post(1, theirs).await.unwrap());
        assert!(!ops.delete_post(1, mine).await.unwrap(), "already gone");

        assert!(repo.get_post(theirs).await.unwrap().is_some());
        let events = repo.list_events(1, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::PostDeleted);
    }

    #[tokio::test]
    async fn delete_scheduled_logs_and_ignores_foreign_items() {
        let (ops, repo, _) = setup().await;
        let item_id = repo
            .insert_scheduled(&NewScheduledItem {
                owner_id: 1,
                post_id: None,
                destination_id: "@news".into(),
                destination_name: "News".into(),
                due_at: DueTime::parse("2030-01-01 10:00").unwrap(),
                content: "Hi".into(),
                media: None,
            })
            .await
            .unwrap();

        assert!(!ops.delete_scheduled_item(2, item_id).await.unwrap());
        assert!(ops.delete_scheduled_item(1, item_id).await.unwrap());
        assert!(!ops.delete_scheduled_item(1, item_id).await.unwrap());

        let events = repo.list_events(1, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ScheduledDeleted);
    }

    #[tokio::test]
    async fn toggle_notifications_flips_and_logs() {
        let (ops, repo, _) = setup().await;

        assert!(!ops.toggle_notifications(1).await.unwrap());
        assert!(ops.toggle_notifications(1).await.unwrap());

        let settings = repo.get_settings(1).await.unwrap();
        assert!(settings.notifications_enabled);

        let changes = repo
            .list_events(1, 10)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::SettingsChanged)
            .count();
        assert_eq!(changes, 2);
    }

    #[tokio::test]
    async fn clear_event_log_empties_the_owner_view() {
        let (ops, repo, _) = setup().await;
        repo.log_event(1, EventKind::Start, "x", None, None)
            .await
            .unwrap();

        ops.clear_event_log(1).await.unwrap();
        assert!(ops.event_log(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn event_log_view_is_capped_at_the_configured_limit() {
        let repo = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let adapter = Arc::new(MockAdapter::new());
        let ops = Ops::new(repo.clone(), adapter, 2);

        for i in 0..5 {
            repo.log_event(1, EventKind::Start, &format!("e{i}"), None, None)
                .await
                .unwrap();
        }

        let view = ops.event_log(1).await.unwrap();
        assert_eq!(view.len(), 2);
        // Newest first
        assert_eq!(view[0].description, "e4");
    }
}
