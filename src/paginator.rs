//! # Pagination
//!
//! Serves fixed-size pages out of one in-memory dataset per view.
//!
//! The feed variant shuffles the dataset on every (re)load and reshuffles
//! when the cursor runs off the end, which makes a finite collection scroll
//! forever. Repeats across a loop boundary are expected. The profile
//! variant keeps the store's most-recent-first order and just wraps back to
//! index 0, so a single pass is strictly chronological.
use tracing::error;

use crate::{
    error::AppError,
    models::Image,
    shuffle::shuffle,
    store::DocumentStore,
};

/// Page size shared by the feed and profile views.
pub const PAGE_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
    /// Reshuffle on every load and at each loop boundary.
    Shuffled,
    /// Preserve store order; loop back to the start unchanged.
    Chronological,
}

/// Where the dataset comes from on initialize/refresh.
#[derive(Debug, Clone)]
pub enum FeedSource {
    Recent { limit: usize },
    Uploader { uid: String },
}

pub struct Paginator {
    order: PageOrder,
    page_size: usize,
    all_items: Vec<Image>,
    displayed: Vec<Image>,
    cursor: usize,
    loading: bool,
}

impl Paginator {
    pub fn feed() -> Self {
        Self::with_page_size(PageOrder::Shuffled, PAGE_SIZE)
    }

    pub fn profile() -> Self {
        Self::with_page_size(PageOrder::Chronological, PAGE_SIZE)
    }

    pub fn with_page_size(order: PageOrder, page_size: usize) -> Self {
        Self {
            order,
            page_size,
            all_items: Vec::new(),
            displayed: Vec::new(),
            cursor: 0,
            loading: false,
        }
    }

    /// Take ownership of a freshly fetched dataset and materialize the
    /// first page.
    pub fn initialize(&mut self, mut items: Vec<Image>) {
        if self.order == PageOrder::Shuffled {
            shuffle(&mut items);
        }

        let first = items.len().min(self.page_size);
        self.displayed = items[..first].to_vec();
        self.all_items = items;
        self.cursor = first;
    }

    /// Append the next page, or reshuffle-and-restart once the cursor has
    /// run past the end of the dataset.
    ///
    /// No-op while a fetch is outstanding or when the dataset is empty, so
    /// re-entrant scroll triggers are dropped rather than queued.
    pub fn load_more(&mut self) {
        if self.loading || self.all_items.is_empty() {
            return;
        }

        if self.cursor < self.all_items.len() {
            let end = (self.cursor + self.page_size).min(self.all_items.len());
            self.displayed
                .extend_from_slice(&self.all_items[self.cursor..end]);
            self.cursor = end;
            return;
        }

        // Loop boundary: start a new pass over the same dataset.
        #[cfg(feature = "verbose")]
        tracing::info!("pagination loop boundary after {} items", self.displayed.len());

        if self.order == PageOrder::Shuffled {
            shuffle(&mut self.all_items);
        }

        let end = self.all_items.len().min(self.page_size);
        self.displayed.extend_from_slice(&self.all_items[..end]);
        self.cursor = end;
    }

    /// Re-fetch and reset, identical to the initial load.
    pub async fn refresh_from(
        &mut self,
        store: &dyn DocumentStore,
        source: &FeedSource,
    ) -> Result<(), AppError> {
        if !self.begin_fetch() {
            return Ok(());
        }

        let fetched = match source {
            FeedSource::Recent { limit } => store.list_images_recent(*limit).await,
            FeedSource::Uploader { uid } => store.list_images_by_uploader(uid).await,
        };
        self.finish_fetch();

        match fetched {
            Ok(items) => {
                self.initialize(items);
                Ok(())
            }
            Err(err) => {
                // Keep whatever was on screen instead of crashing the view.
                error!("feed fetch failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Marks a fetch as in flight. Returns false if one already is.
    pub fn begin_fetch(&mut self) -> bool {
        if self.loading {
            return false;
        }
        self.loading = true;
        true
    }

    pub fn finish_fetch(&mut self) {
        self.loading = false;
    }

    /// Apply a mutation to every in-memory copy of the given image.
    pub fn apply(&mut self, id: &str, f: impl Fn(&mut Image)) {
        for image in self
            .all_items
            .iter_mut()
            .chain(self.displayed.iter_mut())
            .filter(|image| image.id == id)
        {
            f(image);
        }
    }

    pub fn find(&self, id: &str) -> Option<&Image> {
        self.all_items.iter().find(|image| image.id == id)
    }

    pub fn displayed(&self) -> &[Image] {
        &self.displayed
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn dataset_len(&self) -> usize {
        self.all_items.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, Utc};

    use super::{PageOrder, Paginator};
    use crate::models::Image;

    fn image(n: usize) -> Image {
        Image {
            id: format!("img-{n}"),
            image_url: format!("https://cdn.example/img-{n}.jpg"),
            title: format!("image {n}"),
            uploader_uid: "uploader".to_string(),
            uploader_name: "Uploader".to_string(),
            uploader_photo_url: String::new(),
            license: "CC0".to_string(),
            flags: Vec::new(),
            original_work_url: None,
            // Most recent first, like the store returns them.
            uploaded_at: Utc::now() - Duration::minutes(n as i64),
            like_count: 0,
            liked_by: Vec::new(),
        }
    }

    fn dataset(n: usize) -> Vec<Image> {
        (0..n).map(image).collect()
    }

    #[test]
    fn test_first_page() {
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 2);
        p.initialize(dataset(5));

        assert_eq!(p.displayed().len(), 2);
        assert_eq!(p.cursor(), 2);
        assert_eq!(p.dataset_len(), 5);
    }

    #[test]
    fn test_first_pass_covers_every_item() {
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 3);
        p.initialize(dataset(10));

        // Enough calls to finish the first pass exactly.
        for _ in 0..3 {
            p.load_more();
        }

        let first_pass: HashSet<&str> = p.displayed()[..10]
            .iter()
            .map(|image| image.id.as_str())
            .collect();
        assert_eq!(first_pass.len(), 10);
    }

    #[test]
    fn test_growth_arithmetic() {
        // Dataset a multiple of the page size: every call appends a full page.
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 2);
        p.initialize(dataset(8));

        for k in 1..=10 {
            p.load_more();
            assert_eq!(p.displayed().len(), 2 * (k + 1));
        }
    }

    #[test]
    fn test_loop_boundary() {
        // dataset [A,B,C], page size 2.
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 2);
        p.initialize(dataset(3));

        assert_eq!(p.displayed().len(), 2);
        assert_eq!(p.cursor(), 2);

        // Tail of the first pass: one remaining element.
        p.load_more();
        assert_eq!(p.displayed().len(), 3);
        assert_eq!(p.cursor(), 3);

        // Cursor past the end: reshuffle and restart.
        p.load_more();
        assert_eq!(p.displayed().len(), 5);
        assert_eq!(p.cursor(), 2);
    }

    #[test]
    fn test_empty_dataset() {
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 2);
        p.initialize(Vec::new());

        p.load_more();
        assert!(p.displayed().is_empty());
    }

    #[test]
    fn test_dataset_smaller_than_page() {
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 10);
        p.initialize(dataset(3));

        assert_eq!(p.displayed().len(), 3);

        // Immediately takes the loop branch.
        p.load_more();
        assert_eq!(p.displayed().len(), 6);
        assert_eq!(p.cursor(), 3);
    }

    #[test]
    fn test_chronological_order_survives_loop() {
        let mut p = Paginator::with_page_size(PageOrder::Chronological, 2);
        let items = dataset(4);
        let order: Vec<String> = items.iter().map(|image| image.id.clone()).collect();
        p.initialize(items);

        for _ in 0..3 {
            p.load_more();
        }

        let shown: Vec<&str> = p.displayed().iter().map(|i| i.id.as_str()).collect();
        // Two full passes, each in the original order.
        assert_eq!(shown[..4], order.iter().map(String::as_str).collect::<Vec<_>>()[..]);
        assert_eq!(shown[4..8], order.iter().map(String::as_str).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_in_flight_guard_drops_triggers() {
        let mut p = Paginator::with_page_size(PageOrder::Shuffled, 2);
        p.initialize(dataset(6));

        assert!(p.begin_fetch());
        assert!(!p.begin_fetch());

        p.load_more();
        assert_eq!(p.displayed().len(), 2);

        p.finish_fetch();
        p.load_more();
        assert_eq!(p.displayed().len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_from_store() {
        use crate::models::{Actor, NewImage};
        use crate::paginator::FeedSource;
        use crate::store::{DocumentStore, MemoryStore};

        let store = MemoryStore::new();
        let owner = Actor {
            uid: "owner".to_string(),
            name: "Owner".to_string(),
            photo_url: String::new(),
        };
        for n in 0..5 {
            let mut img = Image::new(
                &owner,
                NewImage {
                    image_url: format!("https://cdn.example/{n}.jpg"),
                    title: format!("image {n}"),
                    license: "CC0".to_string(),
                    flags: Vec::new(),
                    original_work_url: None,
                },
            );
            img.uploaded_at = Utc::now() - Duration::minutes(n);
            store.add_image(img).await.unwrap();
        }

        let mut p = Paginator::with_page_size(PageOrder::Chronological, 2);
        p.refresh_from(&store, &FeedSource::Uploader { uid: "owner".to_string() })
            .await
            .unwrap();

        assert_eq!(p.dataset_len(), 5);
        assert_eq!(p.displayed().len(), 2);
        // Profile order is the store's most-recent-first order.
        assert!(p.displayed()[0].uploaded_at >= p.displayed()[1].uploaded_at);

        // A refresh while a fetch is in flight is dropped.
        assert!(p.begin_fetch());
        p.refresh_from(&store, &FeedSource::Recent { limit: 10 })
            .await
            .unwrap();
        assert_eq!(p.dataset_len(), 5);
    }

    #[test]
    fn test_apply_hits_every_copy() {
        let mut p = Paginator::with_page_size(PageOrder::Chronological, 2);
        p.initialize(dataset(3));

        p.apply("img-0", |image| image.like_count = 5);

        assert_eq!(p.find("img-0").unwrap().like_count, 5);
        assert_eq!(p.displayed()[0].like_count, 5);
    }
}
