//! Incoming nightly record schema
//!
//! Wire form of the records supplied by the sleep tracker integration, plus
//! parsing and validation. Everything here runs before any store access.

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
