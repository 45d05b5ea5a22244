//! # Documents
//!
//! Wire/store types shared by the view engine and the HTTP surface.
//!
//! Field names stay camelCase on the wire to match what the web client
//! already sends and renders.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded image document.
///
/// `like_count` and `liked_by` are the only fields mutable by users other
/// than the owner. After any like toggle settles, `like_count` equals
/// `liked_by.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    pub image_url: String,
    pub title: String,
    pub uploader_uid: String,
    pub uploader_name: String,
    pub uploader_photo_url: String,
    pub license: String,
    pub flags: Vec<String>,
    pub original_work_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub like_count: u32,
    pub liked_by: Vec<String>,
}

impl Image {
    pub fn new(actor: &Actor, payload: NewImage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image_url: payload.image_url,
            title: payload.title,
            uploader_uid: actor.uid.clone(),
            uploader_name: actor.name.clone(),
            uploader_photo_url: actor.photo_url.clone(),
            license: payload.license,
            flags: payload.flags,
            original_work_url: payload.original_work_url,
            uploaded_at: Utc::now(),
            like_count: 0,
            liked_by: Vec::new(),
        }
    }

    pub fn liked_by_user(&self, uid: &str) -> bool {
        self.liked_by.iter().any(|u| u == uid)
    }
}

/// Client payload for creating an image. Identity, timestamps and uploader
/// fields are server-assigned, never trusted from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    pub image_url: String,
    pub title: String,
    pub license: String,
    #[serde(default)]
    pub flags: Vec<String>,
    pub original_work_url: Option<String>,
}

/// Owner-editable metadata. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetaUpdate {
    pub title: Option<String>,
    pub license: Option<String>,
    pub flags: Option<Vec<String>>,
    pub original_work_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
}

/// A like event addressed to an image owner.
///
/// Never addressed to the acting user themself. The only mutation after
/// creation is flipping `read` to true; notifications are never deleted,
/// even when the like that caused them is taken back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_uid: String,
    pub actor_uid: String,
    pub actor_name: String,
    pub actor_photo_url: String,
    pub kind: NotificationKind,
    pub image_id: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn like(image: &Image, actor: &Actor) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recipient_uid: image.uploader_uid.clone(),
            actor_uid: actor.uid.clone(),
            actor_name: actor.name.clone(),
            actor_photo_url: actor.photo_url.clone(),
            kind: NotificationKind::Like,
            image_id: image.id.clone(),
            image_url: image.image_url.clone(),
            created_at: Utc::now(),
            read: false,
        }
    }
}

/// Signed-in user context, passed explicitly to every operation that needs
/// one rather than read from some ambient global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub uid: String,
    pub name: String,
    pub photo_url: String,
}

/// Display projection of an uploader, derived from their images.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub uploader_uid: String,
    pub uploader_name: String,
    pub uploader_photo_url: String,
}

impl From<&Image> for ProfileUser {
    fn from(image: &Image) -> Self {
        Self {
            uploader_uid: image.uploader_uid.clone(),
            uploader_name: image.uploader_name.clone(),
            uploader_photo_url: image.uploader_photo_url.clone(),
        }
    }
}
