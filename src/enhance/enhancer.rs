//! Persona enhancement with bounded retries and graceful fallback.
//!
//! The enhancer walks the backend chain in priority order and stops at
//! the first response that validates against the persona profile. Every
//! failure path converges on a fallback result; enhancement can never
//! fail the pipeline.

use crate::config::EnhanceConfig;
use crate::enhance::backends::{Backend, EnhanceRequest};
use crate::models::{EnhancementResult, FallbackReason};
use crate::persona::PersonaProfile;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives the backend chain for one enhancement.
///
/// Wall-clock is bounded by configuration: each backend spends at most
/// `max_attempts * timeout_seconds` plus the backoff sum (the delay
/// doubles after each attempt). Callers can rely on that bound for
/// scheduling.
pub struct PersonaEnhancer {
    backends: Vec<Box<dyn Backend>>,
    config: EnhanceConfig,
}

impl PersonaEnhancer {
    pub fn new(backends: Vec<Box<dyn Backend>>, config: EnhanceConfig) -> Self {
        Self { backends, config }
    }

    /// Enhance the base analysis with the given persona.
    ///
    /// Returns `Fallback("disabled")` without touching the network when
    /// enhancement is off or no backend is configured, and
    /// `Fallback("all_backends_failed")` when the whole chain is
    /// exhausted.
    pub async fn enhance(
        &self,
        base_analysis: &str,
        persona_name: &str,
        profile: &PersonaProfile,
    ) -> EnhancementResult {
        if !self.config.enabled || self.backends.is_empty() {
            debug!("Enhancement disabled or no backends configured");
            return EnhancementResult::Fallback {
                reason: FallbackReason::Disabled,
            };
        }

        let request = EnhanceRequest {
            system_prompt: profile.system_prompt.clone(),
            user_content: format!(
                "Analyze and enhance this research content:\n\n{}",
                base_analysis
            ),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
        };

        for backend in &self.backends {
            if let Some(text) = self.try_backend(backend.as_ref(), &request, profile).await {
                info!("Enhancement applied by backend '{}'", backend.name());
                return EnhancementResult::Enhanced {
                    text,
                    persona: persona_name.to_string(),
                    backend: backend.name().to_string(),
                };
            }
        }

        warn!("All enhancement backends failed; using base analysis");
        EnhancementResult::Fallback {
            reason: FallbackReason::AllBackendsFailed,
        }
    }

    /// Exhaust one backend's retry budget. Returns a validated response
    /// or `None` to advance the chain.
    async fn try_backend(
        &self,
        backend: &dyn Backend,
        request: &EnhanceRequest,
        profile: &PersonaProfile,
    ) -> Option<String> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        for attempt in 1..=self.config.max_attempts.max(1) {
            debug!(
                "Backend '{}' attempt {}/{}",
                backend.name(),
                attempt,
                self.config.max_attempts
            );

            match tokio::time::timeout(timeout, backend.complete(request)).await {
                Ok(Ok(text)) => match validate_response(&text, profile) {
                    Ok(()) => return Some(text),
                    Err(reason) => {
                        // The backend answered; asking again won't help.
                        warn!(
                            "Backend '{}' response rejected: {}",
                            backend.name(),
                            reason
                        );
                        return None;
                    }
                },
                Ok(Err(e)) => {
                    warn!("Backend '{}' failed: {}", backend.name(), e);
                    if !e.is_retryable() {
                        return None;
                    }
                }
                Err(_) => {
                    warn!(
                        "Backend '{}' timed out after {}s",
                        backend.name(),
                        self.config.timeout_seconds
                    );
                }
            }

            if attempt < self.config.max_attempts {
                let delay = self.config.retry_delay_ms * 2u64.pow(attempt - 1);
                debug!("Backing off {}ms before retry", delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        None
    }
}

/// Check a response against the persona's length bounds and required
/// sections.
fn validate_response(text: &str, profile: &PersonaProfile) -> Result<(), String> {
    let length = text.trim().len();

    if length < profile.min_length {
        return Err(format!(
            "response too short: {} chars, minimum {}",
            length, profile.min_length
        ));
    }
    if length > profile.max_length {
        return Err(format!(
            "response too long: {} chars, maximum {}",
            length, profile.max_length
        ));
    }

    for section in &profile.required_sections {
        if !text.contains(section) {
            return Err(format!("missing required section '{}'", section));
        }
    }

    Ok(())
}
