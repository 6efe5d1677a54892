//! Persona profile loading and validation.
//!
//! Personas are loaded once per run from an external JSON document and
//! are immutable afterwards. Malformed profiles are rejected at load
//! time, before any network work happens.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// A named configuration profile controlling prompt framing and sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// System prompt framing the enhancement request.
    pub system_prompt: String,

    /// Sampling temperature, in [0, 2].
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Response token budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Markdown headings every valid response must contain.
    #[serde(default)]
    pub required_sections: Vec<String>,

    /// Minimum acceptable response length, in characters.
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Maximum acceptable response length, in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_min_length() -> usize {
    200
}

fn default_max_length() -> usize {
    20_000
}

/// The persona document on disk: named profiles plus a default choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Which persona to use when none is requested.
    pub default_persona: String,

    /// Profiles by name.
    pub personas: BTreeMap<String, PersonaProfile>,
}

/// Persona selection: the known profiles, or an explicit custom name.
///
/// Unknown bare names are rejected when parsing the selection, so typos
/// surface before the pipeline runs; `custom:<name>` opts into any
/// profile present in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaSelection {
    Scholar,
    Synthesizer,
    Builder,
    Custom(String),
}

impl PersonaSelection {
    /// The profile name this selection resolves to.
    pub fn profile_name(&self) -> &str {
        match self {
            PersonaSelection::Scholar => "scholar",
            PersonaSelection::Synthesizer => "synthesizer",
            PersonaSelection::Builder => "builder",
            PersonaSelection::Custom(name) => name,
        }
    }
}

impl FromStr for PersonaSelection {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scholar" => Ok(PersonaSelection::Scholar),
            "synthesizer" => Ok(PersonaSelection::Synthesizer),
            "builder" => Ok(PersonaSelection::Builder),
            other => match other.strip_prefix("custom:") {
                Some(name) if !name.is_empty() => {
                    Ok(PersonaSelection::Custom(name.to_string()))
                }
                _ => Err(PersonaError::UnknownPersona(other.to_string())),
            },
        }
    }
}

impl fmt::Display for PersonaSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.profile_name())
    }
}

/// Persona loading and validation failures.
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("failed to read persona file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse persona file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("unknown persona '{0}' (use scholar, synthesizer, builder, or custom:<name>)")]
    UnknownPersona(String),

    #[error("persona '{name}' is invalid: {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("default persona '{0}' is not defined in the persona file")]
    MissingDefault(String),

    #[error("persona '{0}' is not defined in the persona file")]
    NotDefined(String),
}

impl PersonaConfig {
    /// Load and validate a persona document.
    pub fn load(path: &Path) -> Result<Self, PersonaError> {
        let content = std::fs::read_to_string(path).map_err(|source| PersonaError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: PersonaConfig =
            serde_json::from_str(&content).map_err(|source| PersonaError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject malformed profiles up front rather than at use time.
    pub fn validate(&self) -> Result<(), PersonaError> {
        if !self.personas.contains_key(&self.default_persona) {
            return Err(PersonaError::MissingDefault(self.default_persona.clone()));
        }

        for (name, profile) in &self.personas {
            profile.validate(name)?;
        }

        Ok(())
    }

    /// Resolve a selection (or the default) to its profile.
    pub fn resolve(
        &self,
        selection: Option<&PersonaSelection>,
    ) -> Result<(String, &PersonaProfile), PersonaError> {
        let name = selection
            .map(|s| s.profile_name().to_string())
            .unwrap_or_else(|| self.default_persona.clone());

        self.personas
            .get(&name)
            .map(|profile| (name.clone(), profile))
            .ok_or(PersonaError::NotDefined(name))
    }
}

impl PersonaProfile {
    fn validate(&self, name: &str) -> Result<(), PersonaError> {
        let invalid = |reason: &str| PersonaError::InvalidProfile {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.system_prompt.trim().is_empty() {
            return Err(invalid("system_prompt is empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature must be in [0, 2]"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be at least 1"));
        }
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(invalid("length bounds must satisfy 0 < min <= max"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_profile() -> PersonaProfile {
        PersonaProfile {
            system_prompt: "You are a careful research analyst.".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            required_sections: vec!["## Key Findings".to_string()],
            min_length: 200,
            max_length: 20_000,
        }
    }

    fn valid_config() -> PersonaConfig {
        let mut personas = BTreeMap::new();
        personas.insert("scholar".to_string(), valid_profile());
        PersonaConfig {
            default_persona: "scholar".to_string(),
            personas,
        }
    }

    #[test]
    fn test_selection_parsing() {
        assert_eq!(
            "scholar".parse::<PersonaSelection>().unwrap(),
            PersonaSelection::Scholar
        );
        assert_eq!(
            "custom:pirate".parse::<PersonaSelection>().unwrap(),
            PersonaSelection::Custom("pirate".to_string())
        );
        assert!("pirate".parse::<PersonaSelection>().is_err());
        assert!("custom:".parse::<PersonaSelection>().is_err());
    }

    #[test]
    fn test_validate_accepts_good_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_default() {
        let mut config = valid_config();
        config.default_persona = "ghost".to_string();
        assert!(matches!(
            config.validate(),
            Err(PersonaError::MissingDefault(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = valid_config();
        config
            .personas
            .get_mut("scholar")
            .unwrap()
            .temperature = 3.0;
        assert!(matches!(
            config.validate(),
            Err(PersonaError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_prompt() {
        let mut config = valid_config();
        config
            .personas
            .get_mut("scholar")
            .unwrap()
            .system_prompt = "   ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_length_bounds() {
        let mut config = valid_config();
        let profile = config.personas.get_mut("scholar").unwrap();
        profile.min_length = 500;
        profile.max_length = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_default_and_explicit() {
        let config = valid_config();

        let (name, _) = config.resolve(None).unwrap();
        assert_eq!(name, "scholar");

        let (name, _) = config.resolve(Some(&PersonaSelection::Scholar)).unwrap();
        assert_eq!(name, "scholar");

        let missing = config.resolve(Some(&PersonaSelection::Builder));
        assert!(matches!(missing, Err(PersonaError::NotDefined(_))));
    }

    #[test]
    fn test_load_parses_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("personas.json");
        std::fs::write(
            &path,
            r###"{
                "default_persona": "scholar",
                "personas": {
                    "scholar": {
                        "system_prompt": "You are The Scholar.",
                        "temperature": 0.6,
                        "max_tokens": 1500,
                        "required_sections": ["## Key Findings"],
                        "min_length": 100,
                        "max_length": 10000
                    }
                }
            }"###,
        )
        .unwrap();

        let config = PersonaConfig::load(&path).unwrap();
        assert_eq!(config.default_persona, "scholar");
        assert_eq!(config.personas["scholar"].max_tokens, 1500);
    }

    #[test]
    fn test_load_rejects_invalid_document() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("personas.json");
        std::fs::write(
            &path,
            r#"{
                "default_persona": "scholar",
                "personas": {
                    "scholar": {
                        "system_prompt": "",
                        "temperature": 0.6
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(PersonaConfig::load(&path).is_err());
    }
}
