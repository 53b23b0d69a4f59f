//! Repository layer for database access.
//!
//! Each store contract is an async trait with a SQLx implementation, so the
//! acquisition and pipeline layers can be exercised against scripted stores.

pub mod api_call;
pub mod media_cache;
pub mod render_job;

pub use api_call::*;
pub use media_cache::*;
pub use render_job::*;
