//! Structured logging setup.

mod format;

pub use format::init;
