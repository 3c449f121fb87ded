//! Error types for the OpenTelemetry operator manifest layer

use thiserror::Error;

/// Main error type for compile and admission operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A custom resource failed an admission precondition
    #[error("validation error: {0}")]
    Validation(String),

    /// A dependent ConfigMap could not be constructed
    #[error("config map error: {0}")]
    ConfigMap(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config map error with the given message
    pub fn config_map(msg: impl Into<String>) -> Self {
        Self::ConfigMap(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Returns true if this error rejects a resource at admission time
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Categories
    // ==========================================================================

    /// Story: admission rejections carry the failing field in their message
    #[test]
    fn story_validation_errors_name_the_field() {
        let err = Error::validation("the OpAMP server endpoint is not specified");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("endpoint"));
        assert!(err.is_rejection());

        match Error::validation("any message") {
            Error::Validation(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: config map failures are a separate category from rejections
    ///
    /// The compilers degrade on these instead of failing, so callers must be
    /// able to tell them apart from validation failures.
    #[test]
    fn story_config_map_errors_are_not_rejections() {
        let err = Error::config_map("collector config is not valid YAML");
        assert!(err.to_string().contains("config map error"));
        assert!(!err.is_rejection());
    }

    #[test]
    fn story_yaml_errors_convert_to_serialization() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn story_error_construction_ergonomics() {
        let name = "my-instance";
        let err = Error::serialization(format!("failed to encode {}", name));
        assert!(err.to_string().contains("my-instance"));

        let err = Error::config_map("static message");
        assert!(err.to_string().contains("static message"));
    }
}
