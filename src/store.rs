//! # Document store
//!
//! Seam between the application and whatever managed document database
//! actually holds images and notifications. Consumers only see the
//! [`DocumentStore`] trait, so the backing store can be swapped without
//! touching the views.
//!
//! ## Requirements
//!
//! - add/get/update/delete on images and notifications
//! - timestamp-descending listing, equality filter by uploader/recipient
//! - atomic set add/remove plus count increment/decrement in one call,
//!   relied on instead of any client-side locking
//! - a live-subscription primitive delivering ordered snapshots on change
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, RwLock};

use crate::models::{Image, ImageMetaUpdate, Notification};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    #[error("not permitted")]
    PermissionDenied,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Live notification subscription: a stream of full, ordered snapshots.
/// Dropping it cancels the subscription.
pub struct NotificationSubscription {
    receiver: watch::Receiver<Vec<Notification>>,
}

impl NotificationSubscription {
    pub fn snapshot(&self) -> Vec<Notification> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next pushed snapshot. Returns `None` once the store
    /// side has gone away.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Notification>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn add_image(&self, image: Image) -> Result<(), StoreError>;
    async fn get_image(&self, id: &str) -> Result<Option<Image>, StoreError>;

    /// Owner-only metadata edit.
    async fn update_image_meta(
        &self,
        id: &str,
        actor_uid: &str,
        update: ImageMetaUpdate,
    ) -> Result<(), StoreError>;

    /// Owner-only delete.
    async fn delete_image(&self, id: &str, actor_uid: &str) -> Result<(), StoreError>;

    /// Most recent first, capped at `limit`.
    async fn list_images_recent(&self, limit: usize) -> Result<Vec<Image>, StoreError>;

    /// One uploader's images, most recent first.
    async fn list_images_by_uploader(&self, uid: &str) -> Result<Vec<Image>, StoreError>;

    /// Atomic like write: set add/remove of `uid` and the matching count
    /// increment/decrement in a single operation.
    async fn apply_like(&self, image_id: &str, uid: &str, liked: bool) -> Result<(), StoreError>;

    async fn add_notification(&self, notification: Notification) -> Result<(), StoreError>;

    /// Most recent first, capped at `limit`.
    async fn list_notifications(
        &self,
        recipient_uid: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError>;

    /// Idempotent batch flip of `read` to true. No-op on empty `ids`.
    async fn mark_notifications_read(
        &self,
        recipient_uid: &str,
        ids: &[String],
    ) -> Result<(), StoreError>;

    /// Live snapshots of the recipient's newest notifications.
    async fn watch_notifications(
        &self,
        recipient_uid: &str,
        limit: usize,
    ) -> Result<NotificationSubscription, StoreError>;
}

struct Watcher {
    limit: usize,
    sender: watch::Sender<Vec<Notification>>,
}

/// In-memory store for local runs and tests.
///
/// `fail_writes` makes every write return `Unavailable`, which is how the
/// rollback paths get exercised.
pub struct MemoryStore {
    images: RwLock<HashMap<String, Image>>,
    notifications: RwLock<Vec<Notification>>,
    watchers: RwLock<HashMap<String, Watcher>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            images: RwLock::new(HashMap::new()),
            notifications: RwLock::new(Vec::new()),
            watchers: RwLock::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        Ok(())
    }

    fn snapshot_for(notifications: &[Notification], recipient_uid: &str, limit: usize) -> Vec<Notification> {
        let mut matching: Vec<Notification> = notifications
            .iter()
            .filter(|n| n.recipient_uid == recipient_uid)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        matching
    }

    async fn push_snapshot(&self, recipient_uid: &str) {
        let notifications = self.notifications.read().await;
        let watchers = self.watchers.read().await;

        if let Some(watcher) = watchers.get(recipient_uid) {
            let snapshot = Self::snapshot_for(&notifications, recipient_uid, watcher.limit);
            // A closed channel just means every subscriber hung up.
            let _ = watcher.sender.send(snapshot);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add_image(&self, image: Image) -> Result<(), StoreError> {
        self.check_writable()?;
        self.images.write().await.insert(image.id.clone(), image);
        Ok(())
    }

    async fn get_image(&self, id: &str) -> Result<Option<Image>, StoreError> {
        Ok(self.images.read().await.get(id).cloned())
    }

    async fn update_image_meta(
        &self,
        id: &str,
        actor_uid: &str,
        update: ImageMetaUpdate,
    ) -> Result<(), StoreError> {
        self.check_writable()?;

        let mut images = self.images.write().await;
        let image = images.get_mut(id).ok_or(StoreError::NotFound)?;

        if image.uploader_uid != actor_uid {
            return Err(StoreError::PermissionDenied);
        }

        if let Some(title) = update.title {
            image.title = title;
        }
        if let Some(license) = update.license {
            image.license = license;
        }
        if let Some(flags) = update.flags {
            image.flags = flags;
        }
        if let Some(url) = update.original_work_url {
            image.original_work_url = Some(url);
        }

        Ok(())
    }

    async fn delete_image(&self, id: &str, actor_uid: &str) -> Result<(), StoreError> {
        self.check_writable()?;

        let mut images = self.images.write().await;
        let image = images.get(id).ok_or(StoreError::NotFound)?;

        if image.uploader_uid != actor_uid {
            return Err(StoreError::PermissionDenied);
        }

        images.remove(id);
        Ok(())
    }

    async fn list_images_recent(&self, limit: usize) -> Result<Vec<Image>, StoreError> {
        let images = self.images.read().await;

        let mut all: Vec<Image> = images.values().cloned().collect();
        all.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        all.truncate(limit);

        Ok(all)
    }

    async fn list_images_by_uploader(&self, uid: &str) -> Result<Vec<Image>, StoreError> {
        let images = self.images.read().await;

        let mut matching: Vec<Image> = images
            .values()
            .filter(|image| image.uploader_uid == uid)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        Ok(matching)
    }

    async fn apply_like(&self, image_id: &str, uid: &str, liked: bool) -> Result<(), StoreError> {
        self.check_writable()?;

        #[cfg(feature = "verbose")]
        tracing::info!("apply_like image={image_id} uid={uid} liked={liked}");

        // Set semantics under one write lock keep likeCount == |likedBy|
        // even when the same transition lands twice.
        let mut images = self.images.write().await;
        let image = images.get_mut(image_id).ok_or(StoreError::NotFound)?;

        if liked {
            if !image.liked_by_user(uid) {
                image.liked_by.push(uid.to_string());
                image.like_count += 1;
            }
        } else if image.liked_by_user(uid) {
            image.liked_by.retain(|u| u != uid);
            image.like_count -= 1;
        }

        Ok(())
    }

    async fn add_notification(&self, notification: Notification) -> Result<(), StoreError> {
        self.check_writable()?;

        let recipient = notification.recipient_uid.clone();
        self.notifications.write().await.push(notification);
        self.push_snapshot(&recipient).await;

        Ok(())
    }

    async fn list_notifications(
        &self,
        recipient_uid: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let notifications = self.notifications.read().await;
        Ok(Self::snapshot_for(&notifications, recipient_uid, limit))
    }

    async fn mark_notifications_read(
        &self,
        recipient_uid: &str,
        ids: &[String],
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.check_writable()?;

        {
            let mut notifications = self.notifications.write().await;
            for notification in notifications
                .iter_mut()
                .filter(|n| n.recipient_uid == recipient_uid && ids.contains(&n.id))
            {
                notification.read = true;
            }
        }
        self.push_snapshot(recipient_uid).await;

        Ok(())
    }

    async fn watch_notifications(
        &self,
        recipient_uid: &str,
        limit: usize,
    ) -> Result<NotificationSubscription, StoreError> {
        let initial = {
            let notifications = self.notifications.read().await;
            Self::snapshot_for(&notifications, recipient_uid, limit)
        };

        let mut watchers = self.watchers.write().await;

        // Evict a watcher every receiver of which has hung up, so it does
        // not pin its limit (or its memory) forever.
        if watchers
            .get(recipient_uid)
            .is_some_and(|w| w.sender.receiver_count() == 0)
        {
            watchers.remove(recipient_uid);
        }

        let receiver = match watchers.get_mut(recipient_uid) {
            Some(watcher) => {
                // A wider cap from a later subscriber takes effect for
                // everyone on the next push.
                watcher.limit = watcher.limit.max(limit);
                watcher.sender.subscribe()
            }
            None => {
                let (sender, receiver) = watch::channel(initial);
                watchers.insert(
                    recipient_uid.to_string(),
                    Watcher { limit, sender },
                );
                receiver
            }
        };

        Ok(NotificationSubscription { receiver })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, NewImage};

    fn actor(uid: &str) -> Actor {
        Actor {
            uid: uid.to_string(),
            name: uid.to_uppercase(),
            photo_url: String::new(),
        }
    }

    fn new_image(title: &str) -> NewImage {
        NewImage {
            image_url: format!("https://cdn.example/{title}.jpg"),
            title: title.to_string(),
            license: "CC0".to_string(),
            flags: vec!["art".to_string()],
            original_work_url: None,
        }
    }

    async fn seed(store: &MemoryStore, owner: &Actor, title: &str) -> Image {
        let image = Image::new(owner, new_image(title));
        store.add_image(image.clone()).await.unwrap();
        image
    }

    #[tokio::test]
    async fn test_like_invariant() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let image = seed(&store, &owner, "sunset").await;

        store.apply_like(&image.id, "u1", true).await.unwrap();
        store.apply_like(&image.id, "u2", true).await.unwrap();
        // Same transition twice must not double-count.
        store.apply_like(&image.id, "u1", true).await.unwrap();

        let stored = store.get_image(&image.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 2);
        assert_eq!(stored.like_count as usize, stored.liked_by.len());

        store.apply_like(&image.id, "u1", false).await.unwrap();
        let stored = store.get_image(&image.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 1);
        assert_eq!(stored.liked_by, vec!["u2".to_string()]);
    }

    #[tokio::test]
    async fn test_owner_only_edits() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let image = seed(&store, &owner, "sunset").await;

        let update = ImageMetaUpdate {
            title: Some("dawn".to_string()),
            ..Default::default()
        };
        let err = store
            .update_image_meta(&image.id, "intruder", update.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied));

        store
            .update_image_meta(&image.id, "owner", update)
            .await
            .unwrap();
        let stored = store.get_image(&image.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "dawn");

        let err = store.delete_image(&image.id, "intruder").await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied));
        store.delete_image(&image.id, "owner").await.unwrap();
        assert!(store.get_image(&image.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_listing_is_descending() {
        let store = MemoryStore::new();
        let owner = actor("owner");

        for n in 0..5 {
            let mut image = Image::new(&owner, new_image(&format!("img{n}")));
            image.uploaded_at = chrono::Utc::now() - chrono::Duration::minutes(n);
            store.add_image(image).await.unwrap();
        }

        let listed = store.list_images_recent(3).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].uploaded_at >= w[1].uploaded_at));
    }

    #[tokio::test]
    async fn test_watch_delivers_snapshots() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let liker = actor("liker");
        let image = seed(&store, &owner, "sunset").await;

        let mut subscription = store.watch_notifications("owner", 30).await.unwrap();
        assert!(subscription.snapshot().is_empty());

        store
            .add_notification(Notification::like(&image, &liker))
            .await
            .unwrap();

        let snapshot = subscription.next_snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].actor_uid, "liker");
        assert!(!snapshot[0].read);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let liker = actor("liker");
        let image = seed(&store, &owner, "sunset").await;

        let notification = Notification::like(&image, &liker);
        let id = notification.id.clone();
        store.add_notification(notification).await.unwrap();

        // Empty input is a no-op even when writes are failing.
        store.fail_writes(true);
        store.mark_notifications_read("owner", &[]).await.unwrap();
        store.fail_writes(false);

        let ids = vec![id];
        store.mark_notifications_read("owner", &ids).await.unwrap();
        store.mark_notifications_read("owner", &ids).await.unwrap();

        let listed = store.list_notifications("owner", 30).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].read);
    }

    #[tokio::test]
    async fn test_dead_watcher_replaced_with_new_limit() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let image = seed(&store, &owner, "sunset").await;

        let narrow = store.watch_notifications("owner", 1).await.unwrap();
        drop(narrow);

        let wide = store.watch_notifications("owner", 5).await.unwrap();
        for n in 0..3 {
            store
                .add_notification(Notification::like(&image, &actor(&format!("u{n}"))))
                .await
                .unwrap();
        }

        // The dead subscription's cap of 1 must not survive it.
        assert_eq!(wide.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_later_subscriber_widens_live_limit() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let image = seed(&store, &owner, "sunset").await;

        let narrow = store.watch_notifications("owner", 1).await.unwrap();
        let _wide = store.watch_notifications("owner", 5).await.unwrap();

        for n in 0..3 {
            store
                .add_notification(Notification::like(&image, &actor(&format!("u{n}"))))
                .await
                .unwrap();
        }

        assert_eq!(narrow.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_fail_writes_rejects() {
        let store = MemoryStore::new();
        let owner = actor("owner");
        let image = seed(&store, &owner, "sunset").await;

        store.fail_writes(true);
        let err = store.apply_like(&image.id, "u1", true).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let stored = store.get_image(&image.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 0);
    }
}
