use std::fmt;

/// Error returned when a class cannot be processed.
///
/// Every variant aborts the whole class: nothing from it reaches the
/// downstream sink. The caller decides whether that fails the build or the
/// class is reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OffsetsError {
    /// A metadata annotation did not match the expected schema.
    Schema(SchemaError),
    /// A method started before the previous one ended.
    NestedMethod {
        class_name: String,
        open_method: String,
        method_name: String,
    },
    /// The stream ended while a method was still open.
    UnterminatedMethod { class_name: String, method_name: String },
}

impl fmt::Display for OffsetsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schema(error) => write!(f, "{error}"),
            Self::NestedMethod {
                class_name,
                open_method,
                method_name,
            } => write!(
                f,
                "method {class_name}.{method_name} declared before {class_name}.{open_method} ended"
            ),
            Self::UnterminatedMethod {
                class_name,
                method_name,
            } => write!(f, "class {class_name} ended inside method {method_name}"),
        }
    }
}

impl std::error::Error for OffsetsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(error) => Some(error),
            _ => None,
        }
    }
}

impl From<SchemaError> for OffsetsError {
    fn from(error: SchemaError) -> Self {
        Self::Schema(error)
    }
}

/// What was wrong with a metadata annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// An element name outside the recognized set.
    UnknownField(String),
    /// A recognized element carrying a value of another kind.
    WrongValueKind {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// A metadata annotation that does not match the expected schema.
///
/// Carries the class, source file and method so the report points at the
/// offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub class_name: String,
    pub source_file: Option<String>,
    pub method_name: String,
    pub method_desc: String,
    pub kind: SchemaErrorKind,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SchemaErrorKind::UnknownField(name) => write!(f, "unexpected metadata field `{name}`")?,
            SchemaErrorKind::WrongValueKind { field, expected, found } => {
                write!(f, "metadata field `{field}` should be {expected}, found {found}")?;
            }
        }
        write!(f, " in {}.{}{}", self.class_name, self.method_name, self.method_desc)?;
        if let Some(source) = &self.source_file {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Error loading an [`OffsetsConfig`](crate::OffsetsConfig).
#[derive(Debug)]
pub struct ConfigError(serde_json::Error);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid offsets configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self(error)
    }
}
