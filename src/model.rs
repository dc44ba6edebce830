//! Core data model: channels, posts, scheduled items, event log, settings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire format for scheduled due times: fixed-width, zero-padded, naive UTC.
///
/// The dispatch loop compares due times to "now" as plain strings. That is
/// only correct because this format is fixed-width and zero-padded — do not
/// reformat stored values.
pub const DUE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A scheduled due time in `YYYY-MM-DD HH:MM` form, UTC, no offset.
///
/// Ordering is lexical, which matches chronological order for this format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DueTime(String);

/// Rejection for due-time strings that don't match the wire format.
#[derive(Debug, thiserror::Error)]
#[error("invalid due time (expected YYYY-MM-DD HH:MM)")]
pub struct InvalidDueTime;

impl DueTime {
    /// Parse user input, normalizing to the fixed-width wire format.
    pub fn parse(input: &str) -> Result<Self, InvalidDueTime> {
        let dt = NaiveDateTime::parse_from_str(input.trim(), DUE_TIME_FORMAT)
            .map_err(|_| InvalidDueTime)?;
        Ok(Self(dt.format(DUE_TIME_FORMAT).to_string()))
    }

    /// Current UTC time rendered in the wire format.
    pub fn now_utc() -> Self {
        Self(Utc::now().format(DUE_TIME_FORMAT).to_string())
    }

    /// Wrap a string already known to be in the wire format (e.g. read back
    /// from the database, which only ever stores normalized values).
    pub fn from_stored(s: String) -> Self {
        Self(s)
    }

    /// Strictly after `now`? Minute granularity — a due time equal to the
    /// current minute counts as not in the future.
    pub fn is_future(&self, now: &DueTime) -> bool {
        self.0 > now.0
    }

    /// Already due at `now`?
    pub fn is_due(&self, now: &DueTime) -> bool {
        self.0 <= now.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DueTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single media attachment: the kind plus the transport's file reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub file_ref: String,
}

/// A registered delivery destination, owned by one user.
///
/// Never mutated after creation; deleted explicitly by its owner.
#[derive(Debug, Clone)]
pub struct Channel {
    pub owner_id: i64,
    pub destination_id: String,
    pub display_name: String,
    pub added_at: DateTime<Utc>,
}

/// Post lifecycle status.
///
/// The core flows never set `Published` — delivery history lives in the
/// event log, not on the post. The variant exists for the stored column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            _ => Self::Draft,
        }
    }
}

/// A composed post. Content is immutable after creation.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub owner_id: i64,
    pub title: Option<String>,
    pub content: String,
    pub media: Option<MediaAttachment>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Display title, falling back like the UI does.
    pub fn title_or_untitled(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// Delivery status of a scheduled item. Transitions exactly once out of
/// `Pending`; `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A delivery that will happen once its due time arrives.
///
/// Content and media are snapshotted from the source post at schedule time,
/// so later post edits or deletion never affect a pending delivery.
#[derive(Debug, Clone)]
pub struct ScheduledItem {
    pub id: i64,
    pub owner_id: i64,
    pub post_id: Option<i64>,
    pub destination_id: String,
    pub destination_name: String,
    pub due_at: DueTime,
    pub content: String,
    pub media: Option<MediaAttachment>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a new scheduled item.
#[derive(Debug, Clone)]
pub struct NewScheduledItem {
    pub owner_id: i64,
    pub post_id: Option<i64>,
    pub destination_id: String,
    pub destination_name: String,
    pub due_at: DueTime,
    pub content: String,
    pub media: Option<MediaAttachment>,
}

impl NewScheduledItem {
    /// Snapshot a post's content and media for delivery to one destination.
    pub fn snapshot(post: &Post, channel: &Channel, due_at: DueTime) -> Self {
        Self {
            owner_id: post.owner_id,
            post_id: Some(post.id),
            destination_id: channel.destination_id.clone(),
            destination_name: channel.display_name.clone(),
            due_at,
            content: post.content.clone(),
            media: post.media.clone(),
        }
    }
}

/// Stable tags for audit-trail entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    ChannelAdded,
    PostCreated,
    PostPublished,
    PostDeleted,
    MultipostSent,
    PostScheduled,
    ScheduledSent,
    ScheduledFailed,
    ScheduledDeleted,
    SettingsChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ChannelAdded => "channel_added",
            Self::PostCreated => "post_created",
            Self::PostPublished => "post_published",
            Self::PostDeleted => "post_deleted",
            Self::MultipostSent => "multipost_sent",
            Self::PostScheduled => "post_scheduled",
            Self::ScheduledSent => "scheduled_sent",
            Self::ScheduledFailed => "scheduled_failed",
            Self::ScheduledDeleted => "scheduled_deleted",
            Self::SettingsChanged => "settings_changed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "channel_added" => Some(Self::ChannelAdded),
            "post_created" => Some(Self::PostCreated),
            "post_published" => Some(Self::PostPublished),
            "post_deleted" => Some(Self::PostDeleted),
            "multipost_sent" => Some(Self::MultipostSent),
            "post_scheduled" => Some(Self::PostScheduled),
            "scheduled_sent" => Some(Self::ScheduledSent),
            "scheduled_failed" => Some(Self::ScheduledFailed),
            "scheduled_deleted" => Some(Self::ScheduledDeleted),
            "settings_changed" => Some(Self::SettingsChanged),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record. Nothing else references these rows.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub id: i64,
    pub owner_id: i64,
    pub kind: EventKind,
    pub description: String,
    pub destination_id: Option<String>,
    pub post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Per-user settings, lazily created with defaults on first access.
///
/// `timezone` is stored for the user but deliberately never consulted by
/// scheduling — due times are naive UTC end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    pub owner_id: i64,
    pub timezone: String,
    pub default_channel: Option<String>,
    pub notifications_enabled: bool,
}

impl UserSettings {
    pub fn defaults_for(owner_id: i64) -> Self {
        Self {
            owner_id,
            timezone: "UTC".to_string(),
            default_channel: None,
            notifications_enabled: true,
        }
    }
}

/// A single typed settings update. Closed set — there is no string-keyed
/// column path anywhere, so the mutable surface is statically checkable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsValue {
    Timezone(String),
    DefaultChannel(Option<String>),
    Notifications(bool),
}

impl SettingsValue {
    /// Field name for log messages.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Timezone(_) => "timezone",
            Self::DefaultChannel(_) => "default_channel",
            Self::Notifications(_) => "notifications",
        }
    }
}
