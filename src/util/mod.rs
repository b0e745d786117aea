//! Small self-contained helpers.

pub mod hyperloglog;

pub use hyperloglog::{HyperLogLog, HyperLogLogError};
