//! Cache invalidation run by mutating handlers.

use tracing::debug;

use crate::domain::keys::{CacheKey, Direction, FEEDS_PREFIX, FeedKind, MOMENTS_PREFIX};
use crate::domain::{StoreError, Value};
use crate::store::Store;

/// Drop every cached post listing.
pub async fn invalidate_feeds(cache: &Store) -> Result<u64, StoreError> {
    let removed = cache.delete_prefix(FEEDS_PREFIX).await?;
    debug!(
        target = "soffio_kv::application::invalidation",
        removed, "feeds invalidated"
    );
    Ok(removed)
}

/// Drop the cached listings of one feed kind only.
pub async fn invalidate_feed_kind(cache: &Store, kind: FeedKind) -> Result<u64, StoreError> {
    cache.delete_prefix(&CacheKey::feeds_prefix(kind)).await
}

pub async fn invalidate_moments(cache: &Store) -> Result<u64, StoreError> {
    let removed = cache.delete_prefix(MOMENTS_PREFIX).await?;
    debug!(
        target = "soffio_kv::application::invalidation",
        removed, "moments invalidated"
    );
    Ok(removed)
}

/// Cached neighbour of `anchor` in `direction`, whichever post it resolved to.
pub async fn cached_adjacent(
    cache: &Store,
    direction: Direction,
    anchor: i64,
) -> Result<Option<Value>, StoreError> {
    let mut matches = cache
        .get_by_suffix(&CacheKey::adjacent_suffix(direction, anchor))
        .await?;
    Ok(if matches.is_empty() {
        None
    } else {
        Some(matches.swap_remove(0))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::domain::Namespace;
    use crate::infra::objects::{MemoryObjectStore, ObjectBackend};

    fn cache() -> Store {
        Store::new(Box::new(ObjectBackend::new(
            Namespace::cache(),
            Arc::new(MemoryObjectStore::new()),
            "kv",
        )))
    }

    async fn seed(cache: &Store, key: CacheKey) {
        cache.set(&key.to_string(), json!(key.to_string())).await.expect("seed");
    }

    #[tokio::test]
    async fn feed_invalidation_spares_moments() {
        let cache = cache();
        for kind in [FeedKind::Normal, FeedKind::Draft] {
            seed(&cache, CacheKey::Feeds { kind, page: 0, limit: 20 }).await;
        }
        seed(&cache, CacheKey::Moments { page: 0, limit: 10 }).await;

        assert_eq!(invalidate_feeds(&cache).await.expect("feeds"), 2);
        assert_eq!(
            cache.all().await.expect("all").into_keys().collect::<Vec<_>>(),
            vec!["moments_0_10".to_string()]
        );
        assert_eq!(invalidate_moments(&cache).await.expect("moments"), 1);
    }

    #[tokio::test]
    async fn feed_kind_invalidation_is_scoped() {
        let cache = cache();
        seed(&cache, CacheKey::Feeds { kind: FeedKind::Normal, page: 1, limit: 20 }).await;
        seed(&cache, CacheKey::Feeds { kind: FeedKind::Draft, page: 1, limit: 20 }).await;

        assert_eq!(
            invalidate_feed_kind(&cache, FeedKind::Draft).await.expect("draft"),
            1
        );
        assert!(cache.get("feeds_normal_1_20").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn adjacent_lookup_ignores_other_anchors() {
        let cache = cache();
        seed(
            &cache,
            CacheKey::Adjacent { from: 4, direction: Direction::Next, anchor: 3 },
        )
        .await;
        seed(
            &cache,
            CacheKey::Adjacent { from: 14, direction: Direction::Next, anchor: 13 },
        )
        .await;

        assert_eq!(
            cached_adjacent(&cache, Direction::Next, 3).await.expect("lookup"),
            Some(json!("4_next_feed_3"))
        );
        assert_eq!(
            cached_adjacent(&cache, Direction::Previous, 3).await.expect("lookup"),
            None
        );
    }
}
