//! Capsule image cache
//!
//! Capsules are images built and tracked by this tool. Existence checks are
//! served from a short TTL cache so hot paths do not shell out every time.
//!
//! | Check | Cached | Notes |
//! |-------|--------|-------|
//! | exists | TTL (5 min) | positive and negative answers |
//! | inspect | never | metadata fetched on demand |
//! | digest | never | fails closed |

pub mod capsule;
pub mod manager;

pub use capsule::{CapsuleCache, CapsuleCacheEntry, ImageDetails, DEFAULT_TTL};
pub use manager::{
    capsule_tag, capsule_tag_with_prefix, CapsuleHandle, CapsuleManager, ClearReport,
    CAPSULE_PREFIX,
};
