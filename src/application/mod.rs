//! Application services built on the store.

pub mod admin;
pub mod error;
pub mod invalidation;
