//! # Like toggle
//!
//! The optimistic toggle is a three-phase operation: compute the next
//! state, apply it to every in-memory copy, then commit remotely with a
//! compensating rollback if the write is rejected. The remote write is a
//! single atomic set-add/remove plus count increment, so concurrent likers
//! never lose updates; the local copy is only ever the acting user's view
//! and may lag other actors until the next refresh.
//!
//! Unliking does not retract a previously created notification. A
//! notification can outlive the like that caused it; that is the current
//! product behavior, kept as-is.
use std::future::Future;

use tracing::{error, warn};

use crate::{
    error::AppError,
    models::{Actor, Image, Notification},
    paginator::Paginator,
    store::{DocumentStore, StoreError},
};

/// Every in-memory copy of the images a toggle must touch: the active
/// paginator (dataset and displayed page) and the detail view, when open.
pub struct LikeViews<'a> {
    pub paginator: &'a mut Paginator,
    pub detail: Option<&'a mut Image>,
}

impl LikeViews<'_> {
    fn find(&self, id: &str) -> Option<&Image> {
        if let Some(image) = self.paginator.find(id) {
            return Some(image);
        }
        self.detail.as_deref().filter(|image| image.id == id)
    }

    fn apply(&mut self, id: &str, f: impl Fn(&mut Image)) {
        self.paginator.apply(id, &f);
        if let Some(image) = self.detail.as_deref_mut() {
            if image.id == id {
                f(image);
            }
        }
    }
}

/// Settled local state after a toggle.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: u32,
}

/// Three-phase optimistic commit: mutate local state, await the remote
/// write, undo the mutation if the write fails.
async fn optimistic<S, Fut, T, E>(
    state: &mut S,
    apply: impl FnOnce(&mut S),
    commit: Fut,
    rollback: impl FnOnce(&mut S),
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    apply(state);

    match commit.await {
        Ok(value) => Ok(value),
        Err(err) => {
            rollback(state);
            Err(err)
        }
    }
}

fn apply_toggle(image: &mut Image, uid: &str, liked: bool) {
    if liked {
        if !image.liked_by_user(uid) {
            image.liked_by.push(uid.to_string());
            image.like_count += 1;
        }
    } else if image.liked_by_user(uid) {
        image.liked_by.retain(|u| u != uid);
        image.like_count -= 1;
    }
}

/// Remote half of the toggle, shared with the HTTP like endpoint: the
/// atomic like write plus, on the like transition only and never for the
/// owner's own image, a notification for the image owner.
///
/// A failed notification write is logged and swallowed; the like itself is
/// the primary write and has already landed.
pub async fn commit_like(
    store: &dyn DocumentStore,
    image: &Image,
    actor: &Actor,
    liked: bool,
) -> Result<(), StoreError> {
    store.apply_like(&image.id, &actor.uid, liked).await?;

    if liked && actor.uid != image.uploader_uid {
        if let Err(err) = store.add_notification(Notification::like(image, actor)).await {
            warn!("like landed but notification write failed: {err}");
        }
    }

    Ok(())
}

/// Toggle the acting user's like on an image, optimistically.
///
/// With no signed-in actor this rejects before touching anything, so the
/// caller can bounce the user to sign-in. On a rejected remote write every
/// local copy is restored to the pre-toggle state; no automatic retry.
pub async fn toggle_like(
    store: &dyn DocumentStore,
    views: &mut LikeViews<'_>,
    image_id: &str,
    actor: Option<&Actor>,
) -> Result<LikeOutcome, AppError> {
    let actor = actor.ok_or(AppError::AuthenticationRequired)?;

    let before = views
        .find(image_id)
        .cloned()
        .ok_or(AppError::NotFound)?;
    let liked = !before.liked_by_user(&actor.uid);

    let uid = actor.uid.clone();
    optimistic(
        views,
        |views| views.apply(image_id, |image| apply_toggle(image, &uid, liked)),
        commit_like(store, &before, actor, liked),
        |views| views.apply(image_id, |image| *image = before.clone()),
    )
    .await
    .map_err(|err| {
        error!("like toggle failed, local state rolled back: {err}");
        AppError::Store(err)
    })?;

    let like_count = if liked {
        before.like_count + 1
    } else {
        before.like_count.saturating_sub(1)
    };

    Ok(LikeOutcome { liked, like_count })
}
