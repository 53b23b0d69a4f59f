//! broll library crate.
//!
//! Finds, caches and renders B-roll clips for narrated video segments,
//! spreading searches over several unreliable media providers.

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod context;
pub mod database;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod pipeline;
pub mod resource;
pub mod utils;

pub use error::{Error, Result};
