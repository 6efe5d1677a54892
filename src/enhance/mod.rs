//! LLM enhancement modules.
//!
//! Backend adapters plus the persona enhancer that drives them with
//! retry, validation, and fallback discipline.

pub mod backends;
pub mod enhancer;

pub use backends::{resolve_backends, Backend, BackendError, EnhanceRequest};
pub use enhancer::PersonaEnhancer;
