//! Decentralized publishing.
//!
//! Builds one signed long-form event per run and fans it out to the
//! configured relay set, best-effort, with per-relay outcomes and a
//! quorum verdict recorded durably.

pub mod event;
pub mod relay;

pub use event::{build_event, parse_keys};
pub use relay::{publish, write_record};
