//! Database models for broll.
//!
//! These models map directly to the database schema. Enum-valued columns are
//! stored as strings and converted through `as_str`/`parse`.

pub mod api_call;
pub mod media_cache;
pub mod render_job;

pub use api_call::*;
pub use media_cache::*;
pub use render_job::*;
