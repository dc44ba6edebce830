//! Repository trait — single async interface for all persistence.
//!
//! Pure data access; no policy. Both the workflow engine and the dispatch
//! loop talk to storage only through this trait, which is what lets tests
//! run everything against an in-memory database.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{
    Channel, EventKind, EventLogEntry, NewScheduledItem, Post, ScheduleStatus, ScheduledItem,
    SettingsValue, UserSettings,
};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Channels ────────────────────────────────────────────────────

    /// Insert a channel for an owner. Idempotent: returns `true` when a row
    /// was actually inserted, `false` when the (owner, destination) pair
    /// already existed.
    async fn add_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
        display_name: &str,
    ) -> Result<bool, DatabaseError>;

    /// All channels for an owner, most recently added first.
    async fn list_channels(&self, owner_id: i64) -> Result<Vec<Channel>, DatabaseError>;

    /// Look up one of the owner's channels by destination.
    async fn get_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<Option<Channel>, DatabaseError>;

    /// Delete an owner's channel. Missing rows are a silent no-op.
    async fn delete_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<(), DatabaseError>;

    // ── Posts ───────────────────────────────────────────────────────

    /// Insert a draft post, returning its id.
    async fn insert_post(
        &self,
        owner_id: i64,
        title: Option<&str>,
        content: &str,
        media: Option<&crate::model::MediaAttachment>,
    ) -> Result<i64, DatabaseError>;

    /// Get a post by id, regardless of owner (callers check ownership).
    async fn get_post(&self, id: i64) -> Result<Option<Post>, DatabaseError>;

    /// All posts for an owner, newest first.
    async fn list_posts(&self, owner_id: i64) -> Result<Vec<Post>, DatabaseError>;

    /// Delete a post scoped to its owner. Missing or foreign rows are a
    /// silent no-op.
    async fn delete_post(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError>;

    // ── Scheduled items ─────────────────────────────────────────────

    /// Insert a pending scheduled item, returning its id.
    async fn insert_scheduled(&self, item: &NewScheduledItem) -> Result<i64, DatabaseError>;

    /// An owner's pending items, ascending by due time.
    async fn list_scheduled(&self, owner_id: i64) -> Result<Vec<ScheduledItem>, DatabaseError>;

    /// All pending items across owners, ascending by due time. This is the
    /// dispatch loop's work query.
    async fn list_pending_scheduled(&self) -> Result<Vec<ScheduledItem>, DatabaseError>;

    /// Atomically move a pending item to a terminal status.
    ///
    /// Returns `true` if this call claimed the transition, `false` if the
    /// item was no longer pending (already sent/failed/deleted). `to` must
    /// be terminal.
    async fn transition_scheduled(
        &self,
        id: i64,
        to: ScheduleStatus,
    ) -> Result<bool, DatabaseError>;

    /// Delete an owner's scheduled item, only while still pending.
    async fn delete_scheduled(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError>;

    // ── Event log ───────────────────────────────────────────────────

    /// Append an audit-trail entry.
    async fn log_event(
        &self,
        owner_id: i64,
        kind: EventKind,
        description: &str,
        destination_id: Option<&str>,
        post_id: Option<i64>,
    ) -> Result<(), DatabaseError>;

    /// An owner's most recent entries, newest first.
    async fn list_events(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DatabaseError>;

    /// Remove all of an owner's entries.
    async fn clear_events(&self, owner_id: i64) -> Result<(), DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get an owner's settings, creating the row with defaults on first
    /// access.
    async fn get_settings(&self, owner_id: i64) -> Result<UserSettings, DatabaseError>;

    /// Apply one typed settings update, creating the row first if needed.
    async fn update_setting(
        &self,
        owner_id: i64,
        value: SettingsValue,
    ) -> Result<(), DatabaseError>;
}
