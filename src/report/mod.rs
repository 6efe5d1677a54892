//! Report composition and output.
//!
//! Builds the daily report once and renders it into the two local file
//! formats.

pub mod composer;

pub use composer::*;
