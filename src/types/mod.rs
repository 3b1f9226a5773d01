//! Shared data types.

mod common;
mod content;
mod message;
mod usage;

pub use common::*;
pub use content::*;
pub use message::*;
pub use usage::*;
