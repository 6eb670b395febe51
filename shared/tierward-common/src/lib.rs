//! Tierward Common Library
//!
//! Shared types used by the Tierward server and by the hosting runtime that
//! feeds it session events.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
