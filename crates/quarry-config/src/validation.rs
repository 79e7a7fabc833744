//! Configuration validation utilities.

use crate::{ProcessorSection, SequencingConfig};
use std::collections::HashSet;

/// Separator between the selection pattern and the output template of a rule.
pub const RULE_SEPARATOR: &str = "=>";

/// Configuration validation utilities.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete sequencing configuration.
    pub fn validate(config: &SequencingConfig) -> Result<(), ValidationError> {
        if config.workers == 0 {
            return Err(ValidationError::InvalidValue(
                "workers".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        if config.queue_capacity == Some(0) {
            return Err(ValidationError::InvalidValue(
                "queue_capacity".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for processor in &config.processors {
            Self::validate_processor(processor)?;
            if !names.insert(processor.name.as_str()) {
                return Err(ValidationError::DuplicateProcessor(processor.name.clone()));
            }
        }

        Ok(())
    }

    /// Validate a processor section.
    fn validate_processor(section: &ProcessorSection) -> Result<(), ValidationError> {
        if section.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if section.class_name.trim().is_empty() {
            return Err(ValidationError::InvalidValue(
                format!("processors.{}.class_name", section.name),
                "must not be empty".to_string(),
            ));
        }

        if section.rules.is_empty() {
            return Err(ValidationError::NoRules(section.name.clone()));
        }

        for rule in &section.rules {
            match rule.split_once(RULE_SEPARATOR) {
                Some((selection, output))
                    if !selection.trim().is_empty() && !output.trim().is_empty() => {}
                _ => {
                    return Err(ValidationError::MalformedRule(
                        section.name.clone(),
                        rule.clone(),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid configuration value
    InvalidValue(String, String),
    /// A processor has an empty name
    EmptyName,
    /// Two processors share a name
    DuplicateProcessor(String),
    /// A processor has no rules
    NoRules(String),
    /// A rule is not of the form `selection => output`
    MalformedRule(String, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidValue(field, reason) => {
                write!(f, "Invalid value for {}: {}", field, reason)
            }
            ValidationError::EmptyName => write!(f, "Processor name must not be empty"),
            ValidationError::DuplicateProcessor(name) => {
                write!(f, "Processor '{}' is defined more than once", name)
            }
            ValidationError::NoRules(name) => write!(f, "Processor '{}' has no rules", name),
            ValidationError::MalformedRule(name, rule) => write!(
                f,
                "Processor '{}' has malformed rule '{}' (expected 'selection => output')",
                name, rule
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_section(name: &str) -> ProcessorSection {
        ProcessorSection::new(name, "text").with_rule("/docs/*/@content => /derived/$1")
    }

    #[test]
    fn test_config_validation() {
        let mut config = SequencingConfig::default().with_processor(valid_section("a"));

        // Should be valid
        assert!(ConfigValidator::validate(&config).is_ok());

        // Same name twice
        config.processors.push(valid_section("a"));
        assert_eq!(
            ConfigValidator::validate(&config),
            Err(ValidationError::DuplicateProcessor("a".to_string()))
        );
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = SequencingConfig::default().with_workers(0);
        assert!(ConfigValidator::validate(&config).is_err());

        let config = SequencingConfig::default().with_queue_capacity(0);
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_processor_without_rules() {
        let config = SequencingConfig::default().with_processor(ProcessorSection::new("a", "text"));
        assert_eq!(
            ConfigValidator::validate(&config),
            Err(ValidationError::NoRules("a".to_string()))
        );
    }

    #[test]
    fn test_malformed_rule() {
        let section = ProcessorSection::new("a", "text").with_rule("/docs/*/@content");
        let config = SequencingConfig::default().with_processor(section);

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedRule(..)));
        assert!(err.to_string().contains("/docs/*/@content"));
    }

    #[test]
    fn test_blank_names_rejected() {
        let config = SequencingConfig::default().with_processor(valid_section("  "));
        assert_eq!(ConfigValidator::validate(&config), Err(ValidationError::EmptyName));
    }
}
