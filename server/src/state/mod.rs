//! Authoritative record of each user's intended privilege level.

mod store;

pub use store::{StateStore, StateStoreOptions};
