//! Error kinds raised while declaring schemas and while marshaling/serializing.

use serde::Serialize;
use std::fmt;

/// Reason code carried by [`FieldInvalid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidKind {
    Required,
    NoneNotAllowed,
    TypeError,
    InvalidChoice,
    NotFound,
    TooMany,
    /// User supplied code, e.g. from a custom validator.
    Custom(String),
}

impl InvalidKind {
    pub fn custom(code: impl Into<String>) -> Self {
        InvalidKind::Custom(code.into())
    }

    /// Stable code used to look up `error_msgs` overrides.
    pub fn code(&self) -> &str {
        match self {
            InvalidKind::Required => "required",
            InvalidKind::NoneNotAllowed => "none_not_allowed",
            InvalidKind::TypeError => "type_error",
            InvalidKind::InvalidChoice => "invalid_choice",
            InvalidKind::NotFound => "not_found",
            InvalidKind::TooMany => "too_many",
            InvalidKind::Custom(code) => code,
        }
    }

    pub fn default_message(&self) -> &str {
        match self {
            InvalidKind::Required => "This is a required field",
            InvalidKind::NoneNotAllowed => "This field cannot be null",
            InvalidKind::TypeError => "Invalid type",
            InvalidKind::InvalidChoice => "Not a valid choice",
            InvalidKind::NotFound => "No existing object could be found",
            InvalidKind::TooMany => "You have provided too many items",
            InvalidKind::Custom(code) => code,
        }
    }
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single field failed validation or resolution.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldInvalid {
    pub field: String,
    pub kind: InvalidKind,
    pub message: String,
}

impl FieldInvalid {
    pub fn new(field: impl Into<String>, kind: InvalidKind) -> Self {
        let message = kind.default_message().to_string();
        FieldInvalid {
            field: field.into(),
            kind,
            message,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Inconsistent field configuration, detected when the field is constructed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("a collection proxies its own name and source; the wrapped field must not set `{0}`")]
    WrappedFieldNamed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    /// The mapper had to create an object but declares no object type.
    #[error("{0} must define an object type")]
    MissingType(String),
    /// A nested field names a mapper that is not in the registry.
    #[error("no mapper named `{0}` has been defined")]
    UnknownMapper(String),
    #[error("mapper `{mapper}` has no role `{role}`")]
    UnknownRole { mapper: String, role: String },
    #[error("{0}: marshal input must be a JSON object")]
    InvalidData(String),
    #[error("{0}: serialize requires an object")]
    MissingObject(String),
    #[error("nesting depth exceeds the limit of {0}")]
    DepthExceeded(usize),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Invalid(#[from] FieldInvalid),
}

impl MapperError {
    /// Errors caused by schema configuration rather than by the data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MapperError::MissingType(_) | MapperError::UnknownMapper(_) | MapperError::UnknownRole { .. }
        )
    }

    /// The field failure, if this error is one.
    pub fn as_invalid(&self) -> Option<&FieldInvalid> {
        match self {
            MapperError::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E = MapperError> = std::result::Result<T, E>;
