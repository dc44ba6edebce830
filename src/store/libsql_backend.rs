//! libSQL backend — async `Repository` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and safe
//! for concurrent async use, which is what serializes conflicting writes
//! between the workflow engine and the dispatch loop.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::model::{
    Channel, DueTime, EventKind, EventLogEntry, MediaAttachment, MediaKind, NewScheduledItem,
    Post, PostStatus, ScheduleStatus, ScheduledItem, SettingsValue, UserSettings,
};
use crate::store::migrations;
use crate::store::traits::Repository;

/// libSQL repository backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 string into DateTime<Utc> (our canonical write format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to a libsql Value.
fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

/// Reassemble a media attachment from its two columns. Both must be present
/// and the kind must be known, otherwise the post is treated as text-only.
fn media_from_columns(kind: Option<String>, file_ref: Option<String>) -> Option<MediaAttachment> {
    let kind = MediaKind::parse(kind.as_deref()?)?;
    Some(MediaAttachment {
        kind,
        file_ref: file_ref?,
    })
}

fn media_columns(media: Option<&MediaAttachment>) -> (libsql::Value, libsql::Value) {
    match media {
        Some(m) => (
            libsql::Value::Text(m.kind.as_str().to_string()),
            libsql::Value::Text(m.file_ref.clone()),
        ),
        None => (libsql::Value::Null, libsql::Value::Null),
    }
}

fn row_to_channel(row: &libsql::Row) -> Result<Channel, String> {
    let added_str: String = row.get(3).map_err(|e| e.to_string())?;
    Ok(Channel {
        owner_id: row.get(0).map_err(|e| e.to_string())?,
        destination_id: row.get(1).map_err(|e| e.to_string())?,
        display_name: row.get(2).map_err(|e| e.to_string())?,
        added_at: parse_datetime(&added_str),
    })
}

fn row_to_post(row: &libsql::Row) -> Result<Post, String> {
    let media_kind: Option<String> = row.get(4).ok();
    let media_ref: Option<String> = row.get(5).ok();
    let status_str: String = row.get(6).map_err(|e| e.to_string())?;
    let created_str: String = row.get(7).map_err(|e| e.to_string())?;
    let updated_str: String = row.get(8).map_err(|e| e.to_string())?;

    Ok(Post {
        id: row.get(0).map_err(|e| e.to_string())?,
        owner_id: row.get(1).map_err(|e| e.to_string())?,
        title: row.get(2).ok(),
        content: row.get(3).map_err(|e| e.to_string())?,
        media: media_from_columns(media_kind, media_ref),
        status: PostStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_scheduled(row: &libsql::Row) -> Result<ScheduledItem, String> {
    let due_str: String = row.get(5).map_err(|e| e.to_string())?;
    let media_kind: Option<String> = row.get(7).ok();
    let media_ref: Option<String> = row.get(8).ok();
    let status_str: String = row.get(9).map_err(|e| e.to_string())?;
    let created_str: String = row.get(10).map_err(|e| e.to_string())?;

    Ok(ScheduledItem {
        id: row.get(0).map_err(|e| e.to_string())?,
        owner_id: row.get(1).map_err(|e| e.to_string())?,
        post_id: row.get(2).ok(),
        destination_id: row.get(3).map_err(|e| e.to_string())?,
        destination_name: row.get(4).map_err(|e| e.to_string())?,
        due_at: DueTime::from_stored(due_str),
        content: row.get(6).map_err(|e| e.to_string())?,
        media: media_from_columns(media_kind, media_ref),
        status: ScheduleStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_event(row: &libsql::Row) -> Result<EventLogEntry, String> {
    let kind_str: String = row.get(2).map_err(|e| e.to_string())?;
    let kind =
        EventKind::parse(&kind_str).ok_or_else(|| format!("unknown event kind '{kind_str}'"))?;
    let created_str: String = row.get(6).map_err(|e| e.to_string())?;

    Ok(EventLogEntry {
        id: row.get(0).map_err(|e| e.to_string())?,
        owner_id: row.get(1).map_err(|e| e.to_string())?,
        kind,
        description: row.get(3).map_err(|e| e.to_string())?,
        destination_id: row.get(4).ok(),
        post_id: row.get(5).ok(),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const CHANNEL_COLUMNS: &str = "owner_id, destination_id, display_name, added_at";

const POST_COLUMNS: &str =
    "id, owner_id, title, content, media_kind, media_ref, status, created_at, updated_at";

const SCHEDULED_COLUMNS: &str = "id, owner_id, post_id, destination_id, destination_name, \
     due_at, content, media_kind, media_ref, status, created_at";

const EVENT_COLUMNS: &str =
    "id, owner_id, kind, description, destination_id, post_id, created_at";

#[async_trait]
impl Repository for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Channels ────────────────────────────────────────────────────

    async fn add_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
        display_name: &str,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO channels (owner_id, destination_id, display_name, added_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![owner_id, destination_id, display_name, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_channel: {e}")))?;

        debug!(owner_id, destination_id, inserted = inserted > 0, "Channel add");
        Ok(inserted > 0)
    }

    async fn list_channels(&self, owner_id: i64) -> Result<Vec<Channel>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE owner_id = ?1 ORDER BY added_at DESC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_channels: {e}")))?;

        let mut channels = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_channel(&row) {
                Ok(ch) => channels.push(ch),
                Err(e) => tracing::warn!("Skipping channel row: {e}"),
            }
        }
        Ok(channels)
    }

    async fn get_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<Option<Channel>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM channels WHERE owner_id = ?1 AND destination_id = ?2"
                ),
                params![owner_id, destination_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_channel: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let channel =
                    row_to_channel(&row).map_err(|e| DatabaseError::Query(format!("get_channel row: {e}")))?;
                Ok(Some(channel))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_channel: {e}"))),
        }
    }

    async fn delete_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM channels WHERE owner_id = ?1 AND destination_id = ?2",
                params![owner_id, destination_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_channel: {e}")))?;
        Ok(())
    }

    // ── Posts ───────────────────────────────────────────────────────

    async fn insert_post(
        &self,
        owner_id: i64,
        title: Option<&str>,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let (media_kind, media_ref) = media_columns(media);
        self.conn()
            .execute(
                "INSERT INTO posts (owner_id, title, content, media_kind, media_ref, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'draft', ?6, ?6)",
                params![owner_id, opt_text(title), content, media_kind, media_ref, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_post: {e}")))?;

        let id = self.conn().last_insert_rowid();
        debug!(post_id = id, owner_id, "Post inserted");
        Ok(id)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_post: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let post =
                    row_to_post(&row).map_err(|e| DatabaseError::Query(format!("get_post row: {e}")))?;
                Ok(Some(post))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_post: {e}"))),
        }
    }

    async fn list_posts(&self, owner_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {POST_COLUMNS} FROM posts WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_posts: {e}")))?;

        let mut posts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_post(&row) {
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!("Skipping post row: {e}"),
            }
        }
        Ok(posts)
    }

    async fn delete_post(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM posts WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_post: {e}")))?;
        Ok(())
    }

    // ── Scheduled items ─────────────────────────────────────────────

    async fn insert_scheduled(&self, item: &NewScheduledItem) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let (media_kind, media_ref) = media_columns(item.media.as_ref());
        self.conn()
            .execute(
                "INSERT INTO scheduled_items
                    (owner_id, post_id, destination_id, destination_name, due_at, content,
                     media_kind, media_ref, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9)",
                params![
                    item.owner_id,
                    opt_int(item.post_id),
                    item.destination_id.as_str(),
                    item.destination_name.as_str(),
                    item.due_at.as_str(),
                    item.content.as_str(),
                    media_kind,
                    media_ref,
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_scheduled: {e}")))?;

        let id = self.conn().last_insert_rowid();
        debug!(item_id = id, owner_id = item.owner_id, due_at = %item.due_at, "Scheduled item inserted");
        Ok(id)
    }

    async fn list_scheduled(&self, owner_id: i64) -> Result<Vec<ScheduledItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SCHEDULED_COLUMNS} FROM scheduled_items
                     WHERE owner_id = ?1 AND status = 'pending' ORDER BY due_at ASC, id ASC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_scheduled: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_scheduled(&row) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping scheduled row: {e}"),
            }
        }
        Ok(items)
    }

    async fn list_pending_scheduled(&self) -> Result<Vec<ScheduledItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SCHEDULED_COLUMNS} FROM scheduled_items
                     WHERE status = 'pending' ORDER BY due_at ASC, id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_pending_scheduled: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_scheduled(&row) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping scheduled row: {e}"),
            }
        }
        Ok(items)
    }

    async fn transition_scheduled(
        &self,
        id: i64,
        to: ScheduleStatus,
    ) -> Result<bool, DatabaseError> {
        if !to.is_terminal() {
            return Err(DatabaseError::Constraint(format!(
                "scheduled item {id}: cannot transition back to '{to}'"
            )));
        }

        // The WHERE guard makes the claim atomic: at most one caller sees a
        // rows-changed count of 1 for a given item.
        let changed = self
            .conn()
            .execute(
                "UPDATE scheduled_items SET status = ?1 WHERE id = ?2 AND status = 'pending'",
                params![to.as_str(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("transition_scheduled: {e}")))?;

        debug!(item_id = id, to = %to, claimed = changed > 0, "Scheduled status transition");
        Ok(changed > 0)
    }

    async fn delete_scheduled(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM scheduled_items WHERE id = ?1 AND owner_id = ?2 AND status = 'pending'",
                params![id, owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_scheduled: {e}")))?;
        Ok(())
    }

    // ── Event log ───────────────────────────────────────────────────

    async fn log_event(
        &self,
        owner_id: i64,
        kind: EventKind,
        description: &str,
        destination_id: Option<&str>,
        post_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO event_log (owner_id, kind, description, destination_id, post_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    owner_id,
                    kind.as_str(),
                    description,
                    opt_text(destination_id),
                    opt_int(post_id),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("log_event: {e}")))?;
        Ok(())
    }

    async fn list_events(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM event_log
                     WHERE owner_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                ),
                params![owner_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_event(&row) {
                Ok(ev) => events.push(ev),
                Err(e) => tracing::warn!("Skipping event row: {e}"),
            }
        }
        Ok(events)
    }

    async fn clear_events(&self, owner_id: i64) -> Result<(), DatabaseError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM event_log WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_events: {e}")))?;

        debug!(owner_id, removed, "Event log cleared");
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_settings(&self, owner_id: i64) -> Result<UserSettings, DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO settings (owner_id) VALUES (?1)",
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_settings insert: {e}")))?;

        let mut rows = self
            .conn()
            .query(
                "SELECT owner_id, timezone, default_channel, notifications FROM settings WHERE owner_id = ?1",
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_settings: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let notifications: i64 = row.get(3).unwrap_or(1);
                Ok(UserSettings {
                    owner_id: row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("get_settings row: {e}")))?,
                    timezone: row.get(1).unwrap_or_else(|_| "UTC".to_string()),
                    default_channel: row.get(2).ok(),
                    notifications_enabled: notifications != 0,
                })
            }
            _ => Ok(UserSettings::defaults_for(owner_id)),
        }
    }

    async fn update_setting(
        &self,
        owner_id: i64,
        value: SettingsValue,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO settings (owner_id) VALUES (?1)",
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_setting insert: {e}")))?;

        // Closed set of mutable fields; each variant maps to a fixed column.
        let result = match &value {
            SettingsValue::Timezone(tz) => {
                self.conn()
                    .execute(
                        "UPDATE settings SET timezone = ?1 WHERE owner_id = ?2",
                        params![tz.as_str(), owner_id],
                    )
                    .await
            }
            SettingsValue::DefaultChannel(dest) => {
                self.conn()
                    .execute(
                        "UPDATE settings SET default_channel = ?1 WHERE owner_id = ?2",
                        params![opt_text(dest.as_deref()), owner_id],
                    )
                    .await
            }
            SettingsValue::Notifications(enabled) => {
                self.conn()
                    .execute(
                        "UPDATE settings SET notifications = ?1 WHERE owner_id = ?2",
                        params![*enabled as i64, owner_id],
                    )
                    .await
            }
        };

        result.map_err(|e| {
            DatabaseError::Query(format!("update_setting {}: {e}", value.field_name()))
        })?;
        debug!(owner_id, field = value.field_name(), "Setting updated");
        Ok(())
    }
}
