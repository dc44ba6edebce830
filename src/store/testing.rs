//! Fault-injecting repository wrapper for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{
    Channel, EventKind, EventLogEntry, MediaAttachment, NewScheduledItem, Post, ScheduleStatus,
    ScheduledItem, SettingsValue, UserSettings,
};
use crate::store::Repository;

/// Delegates everything to the wrapped repository, but individual methods
/// can be switched to fail. Lets tests exercise the paths where storage
/// breaks partway through an operation.
pub(crate) struct FaultyRepository {
    inner: Arc<dyn Repository>,
    fail_log_event: AtomicBool,
    fail_get_settings: AtomicBool,
}

impl FaultyRepository {
    pub(crate) fn wrap(inner: Arc<dyn Repository>) -> Self {
        Self {
            inner,
            fail_log_event: AtomicBool::new(false),
            fail_get_settings: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_log_event(&self) {
        self.fail_log_event.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_get_settings(&self) {
        self.fail_get_settings.store(true, Ordering::SeqCst);
    }

    fn injected(&self, method: &str) -> DatabaseError {
        DatabaseError::Query(format!("{method}: injected failure"))
    }
}

#[async_trait]
impl Repository for FaultyRepository {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }

    async fn add_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
        display_name: &str,
    ) -> Result<bool, DatabaseError> {
        self.inner
            .add_channel(owner_id, destination_id, display_name)
            .await
    }

    async fn list_channels(&self, owner_id: i64) -> Result<Vec<Channel>, DatabaseError> {
        self.inner.list_channels(owner_id).await
    }

    async fn get_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<Option<Channel>, DatabaseError> {
        self.inner.get_channel(owner_id, destination_id).await
    }

    async fn delete_channel(
        &self,
        owner_id: i64,
        destination_id: &str,
    ) -> Result<(), DatabaseError> {
        self.inner.delete_channel(owner_id, destination_id).await
    }

    async fn insert_post(
        &self,
        owner_id: i64,
        title: Option<&str>,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<i64, DatabaseError> {
        self.inner.insert_post(owner_id, title, content, media).await
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, DatabaseError> {
        self.inner.get_post(id).await
    }

    async fn list_posts(&self, owner_id: i64) -> Result<Vec<Post>, DatabaseError> {
        self.inner.list_posts(owner_id).await
    }

    async fn delete_post(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError> {
        self.inner.delete_post(id, owner_id).await
    }

    async fn insert_scheduled(&self, item: &NewScheduledItem) -> Result<i64, DatabaseError> {
        self.inner.insert_scheduled(item).await
    }

    async fn list_scheduled(&self, owner_id: i64) -> Result<Vec<ScheduledItem>, DatabaseError> {
        self.inner.list_scheduled(owner_id).await
    }

    async fn list_pending_scheduled(&self) -> Result<Vec<ScheduledItem>, DatabaseError> {
        self.inner.list_pending_scheduled().await
    }

    async fn transition_scheduled(
        &self,
        id: i64,
        to: ScheduleStatus,
    ) -> Result<bool, DatabaseError> {
        self.inner.transition_scheduled(id, to).await
    }

    async fn delete_scheduled(&self, id: i64, owner_id: i64) -> Result<(), DatabaseError> {
        self.inner.delete_scheduled(id, owner_id).await
    }

    async fn log_event(
        &self,
        owner_id: i64,
        kind: EventKind,
        description: &str,
        destination_id: Option<&str>,
        post_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        if self.fail_log_event.load(Ordering::SeqCst) {
            return Err(self.injected("log_event"));
        }
        self.inner
            .log_event(owner_id, kind, description, destination_id, post_id)
            .await
    }

    async fn list_events(
        &self,
        owner_id: i64,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, DatabaseError> {
        self.inner.list_events(owner_id, limit).await
    }

    async fn clear_events(&self, owner_id: i64) -> Result<(), DatabaseError> {
        self.inner.clear_events(owner_id).await
    }

    async fn get_settings(&self, owner_id: i64) -> Result<UserSettings, DatabaseError> {
        if self.fail_get_settings.load(Ordering::SeqCst) {
            return Err(self.injected("get_settings"));
        }
        self.inner.get_settings(owner_id).await
    }

    async fn update_setting(
        &self,
        owner_id: i64,
        value: SettingsValue,
    ) -> Result<(), DatabaseError> {
        self.inner.update_setting(owner_id, value).await
    }
}
