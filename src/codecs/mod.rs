//! Serializer Implementations
//!
//! Built-in implementations of the [`CacheSerializer`](crate::traits::CacheSerializer) trait.

mod json;
pub use json::JsonSerializer;
