//! Shared types and utilities for the fieldhouse sync core.

pub mod error;
pub mod group;
pub mod ids;
pub mod models;
pub mod protocol;

pub use error::*;
pub use group::*;
pub use ids::*;
pub use models::*;
pub use protocol::*;
