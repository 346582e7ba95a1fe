//! Core types for the test pipeline: builder and error handling.

pub mod builder;
pub mod error;

pub use builder::HarnessBuilder;
pub use error::{Error, Result};
