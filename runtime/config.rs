//! Collector configuration

use std::env;

/// How much the collector trusts its caller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    /// Tags and headers are used as-is
    Trusted,
    /// Every reference and header is checked against the space bounds before it's followed
    Checked,
}

impl Validation {
    fn parse(value: &str) -> Option<Validation> {
        match value.trim().to_ascii_lowercase().as_str() {
            "checked" => Some(Validation::Checked),
            "trusted" => Some(Validation::Trusted),
            _ => None,
        }
    }
}

impl Default for Validation {
    fn default() -> Validation {
        if cfg!(debug_assertions) {
            Validation::Checked
        } else {
            Validation::Trusted
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Initial size of both from-space and to-space in words
    pub initial_words: usize,
    pub validation: Validation,
}

impl Config {
    pub const DEFAULT_INITIAL_WORDS: usize = 1024;

    /// Environment variable overriding [`Config::validation`]
    pub const VALIDATION_ENV_VAR: &'static str = "SEMISPACE_GC_VALIDATION";

    /// Returns the default configuration with any environment overrides applied
    pub fn from_env() -> Config {
        Self::default().with_env_value(env::var(Self::VALIDATION_ENV_VAR).ok().as_deref())
    }

    fn with_env_value(self, value: Option<&str>) -> Config {
        match value {
            None => self,
            Some(value) => match Validation::parse(value) {
                Some(validation) => self.with_validation(validation),
                None => {
                    log::warn!(
                        "ignoring unknown {} value {:?}; expected `checked` or `trusted`",
                        Self::VALIDATION_ENV_VAR,
                        value
                    );
                    self
                }
            },
        }
    }

    pub fn with_initial_words(self, initial_words: usize) -> Config {
        Config {
            initial_words,
            ..self
        }
    }

    pub fn with_validation(self, validation: Validation) -> Config {
        Config { validation, ..self }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            initial_words: Self::DEFAULT_INITIAL_WORDS,
            validation: Validation::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder() {
        let config = Config::default()
            .with_initial_words(8)
            .with_validation(Validation::Trusted);

        assert_eq!(8, config.initial_words);
        assert_eq!(Validation::Trusted, config.validation);
    }

    #[test]
    fn env_value() {
        let trusted = Config::default().with_validation(Validation::Trusted);

        assert_eq!(trusted, trusted.with_env_value(None));
        assert_eq!(trusted, trusted.with_env_value(Some("bogus")));
        assert_eq!(
            Validation::Checked,
            trusted.with_env_value(Some(" Checked ")).validation
        );
        assert_eq!(
            Validation::Trusted,
            trusted
                .with_validation(Validation::Checked)
                .with_env_value(Some("trusted"))
                .validation
        );
    }
}
