//! Cache key conventions for the ephemeral namespace.
//!
//! Keys stay plain strings in storage; prefix invalidation and suffix lookup
//! rely on the layouts rendered here:
//!
//! - `feeds_<kind>_<page>_<limit>`: paginated post listings
//! - `moments_<page>_<limit>`: paginated moments
//! - `<from>_<direction>_feed_<anchor>`: adjacent-post navigation

use std::fmt;

/// Prefix shared by every paginated post listing.
pub const FEEDS_PREFIX: &str = "feeds_";
/// Prefix shared by every paginated moments listing.
pub const MOMENTS_PREFIX: &str = "moments_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Normal,
    Draft,
    Unlisted,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Draft => "draft",
            Self::Unlisted => "unlisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Previous,
    Next,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Next => "next",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Previous => Self::Next,
            Self::Next => Self::Previous,
        }
    }
}

/// Typed builder for keys in the cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Feeds {
        kind: FeedKind,
        page: u32,
        limit: u32,
    },
    Moments {
        page: u32,
        limit: u32,
    },
    /// Post adjacent to `anchor` in `direction`, resolved to post `from`.
    Adjacent {
        from: i64,
        direction: Direction,
        anchor: i64,
    },
}

impl CacheKey {
    /// Trailing part of every adjacent key for `anchor`, usable without
    /// knowing which post it resolved to.
    pub fn adjacent_suffix(direction: Direction, anchor: i64) -> String {
        format!("{}_feed_{anchor}", direction.as_str())
    }

    /// Prefix matching every listing of one feed kind.
    pub fn feeds_prefix(kind: FeedKind) -> String {
        format!("{FEEDS_PREFIX}{}_", kind.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feeds { kind, page, limit } => {
                write!(f, "{FEEDS_PREFIX}{}_{page}_{limit}", kind.as_str())
            }
            Self::Moments { page, limit } => write!(f, "{MOMENTS_PREFIX}{page}_{limit}"),
            Self::Adjacent {
                from,
                direction,
                anchor,
            } => write!(f, "{from}_{}", Self::adjacent_suffix(*direction, *anchor)),
        }
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.to_string()
    }
}
