//! URL handling and identity derivation
//!
//! Entities without a natural numeric key (listing results, review
//! permalinks, user profiles) are keyed by a hash of their canonical URL.

mod identity;
mod normalize;

pub use identity::{hash_id, ID_MODULUS};
pub use normalize::{canonical_url, resolve_link};
