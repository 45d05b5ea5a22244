//! # Notifications
//!
//! Live like-event feed for the signed-in user, fed by the store's
//! snapshot subscription. Snapshots arrive newest-first and capped; they
//! may interleave arbitrarily with in-flight like toggles, so this feed
//! and the image views are treated as independent, eventually-consistent
//! streams. Dropping the feed cancels the subscription.
use crate::{
    error::AppError,
    models::{Actor, Notification},
    store::{DocumentStore, NotificationSubscription},
};

/// How many recent notifications a recipient sees.
pub const NOTIFICATION_LIMIT: usize = 30;

pub struct NotificationFeed {
    recipient_uid: String,
    entries: Vec<Notification>,
    subscription: NotificationSubscription,
}

impl NotificationFeed {
    /// Subscribe for the signed-in recipient and take the current snapshot.
    pub async fn open(store: &dyn DocumentStore, actor: &Actor) -> Result<Self, AppError> {
        let subscription = store
            .watch_notifications(&actor.uid, NOTIFICATION_LIMIT)
            .await?;
        let entries = subscription.snapshot();

        Ok(Self {
            recipient_uid: actor.uid.clone(),
            entries,
            subscription,
        })
    }

    /// Wait for the next pushed snapshot and adopt it. Returns false once
    /// the store side has gone away.
    pub async fn poll(&mut self) -> bool {
        match self.subscription.next_snapshot().await {
            Some(snapshot) => {
                self.entries = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    /// Derived, never stored.
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    /// Idempotent batch flip to read. No-op on empty input.
    pub async fn mark_read(
        &mut self,
        store: &dyn DocumentStore,
        ids: &[String],
    ) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }

        store
            .mark_notifications_read(&self.recipient_uid, ids)
            .await?;

        for entry in self.entries.iter_mut().filter(|n| ids.contains(&n.id)) {
            entry.read = true;
        }

        Ok(())
    }

    /// Opening a notification marks it read and hands back the image to
    /// navigate to.
    pub async fn open_target(
        &mut self,
        store: &dyn DocumentStore,
        notification_id: &str,
    ) -> Result<Option<String>, AppError> {
        let Some(image_id) = self
            .entries
            .iter()
            .find(|n| n.id == notification_id)
            .map(|n| n.image_id.clone())
        else {
            return Ok(None);
        };

        self.mark_read(store, &[notification_id.to_string()]).await?;

        Ok(Some(image_id))
    }
}
