//! Tierward Server
//!
//! Keeps each user's intended privilege tier (PLAYER, LOWOP, OP), enforces it
//! through an external permission engine, repairs drift when users join, and
//! keeps an audit trail of every change.

pub mod api;
pub mod audit;
pub mod config;
pub mod control;
pub mod engine;
pub mod health;
pub mod notify;
pub mod ratelimit;
pub mod reconcile;
pub mod state;
pub mod storage;
pub mod util;
