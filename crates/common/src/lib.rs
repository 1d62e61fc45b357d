//! Shared infrastructure for the Fen back-end crates.
//!
//! - [`debug`] - Per-module logging controlled via `DEBUG` environment variable
//! - [`leb`] - LEB128 encoders, including the fixed-width four-byte form
//! - [`target`] - The subset of the target triple the back-end consumes

pub mod debug;
pub mod leb;
pub mod target;

pub use debug::{create_logger, Logger};
pub use target::{Endian, Format, PtrWidth, Target};
