use std::ops::Range;

use strum::EnumIs;
use thiserror::Error;

use crate::types::TypeId;

/// Boxed error type that primitive factories may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single syntax diagnostic produced while parsing an expression string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human-readable description of the problem.
    pub message: String,
    /// Byte range of the offending input.
    pub span: Range<usize>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

#[derive(Debug, EnumIs, Error)]
pub enum Error {
    /// The declared signature of a primitive is not acceptable.
    #[error("Invalid signature for primitive `{primitive}`: {reason}.")]
    Signature { primitive: String, reason: String },

    /// A primitive with the same name is already registered.
    #[error(
        "A primitive named `{0}` is already registered. Primitive names must be unique within a primitive set."
    )]
    DuplicateName(String),

    /// A type identifier that was not minted by the registry in use.
    #[error("Type `{0}` is not known to this type registry.")]
    UnknownType(TypeId),

    /// A name that does not resolve to any registered primitive.
    #[error("Name `{0}` does not refer to any registered primitive or terminal.")]
    UnknownName(String),

    /// No candidate could be drawn while generating an expression.
    #[error("Cannot generate a subtree of type `{ty}`: {reason}.")]
    Generation { ty: String, reason: String },

    /// The textual notation could not be parsed.
    #[error("Failed to parse expression:\n{}", list_diagnostics(.errors))]
    Parse { errors: Vec<Diagnostic> },

    /// A primitive is applied to the wrong number of arguments.
    #[error("Primitive `{primitive}` expects {expected} argument(s), but {found} were given.")]
    Arity {
        primitive: String,
        expected: usize,
        found: usize,
    },

    /// A subtree's return type does not fit the type required at its position.
    #[error("Primitive `{primitive}` returns `{found}`, but a `{expected}` is required here.")]
    TypeMismatch {
        primitive: String,
        expected: String,
        found: String,
    },

    /// The flat encoding does not describe exactly one tree.
    #[error("Malformed expression: {reason}.")]
    MalformedExpression { reason: String },

    /// A required hyperparameter was neither supplied nor defaulted.
    #[error("Hyperparameter `{hyperparameter}` of primitive `{primitive}` not provided.")]
    MissingHyperparameter {
        primitive: String,
        hyperparameter: String,
    },

    /// A hyperparameter holds a value of an unexpected kind.
    #[error(
        "Hyperparameter `{hyperparameter}` of primitive `{primitive}` is expected to be {expected}, but found {found}."
    )]
    HyperparameterType {
        primitive: String,
        hyperparameter: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A factory attempted to set a parameter it never declared.
    #[error("Primitive `{primitive}` does not declare a parameter named `{parameter}`.")]
    UndeclaredParameter { primitive: String, parameter: String },

    /// A factory returned without setting one of its declared parameters.
    #[error("Parameter `{parameter}` of primitive `{primitive}` was not initialized by its factory.")]
    UninitializedParameter { primitive: String, parameter: String },

    /// A factory reported an error of its own.
    #[error("Factory of primitive `{primitive}` failed: {source}")]
    Factory {
        primitive: String,
        #[source]
        source: BoxError,
    },

    /// Wrapper raised at the instantiation boundary.
    #[error(
        "When instantiating the expression {expression}, the following error occurred:\n\n{source}"
    )]
    Instantiation {
        expression: String,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hyperparameter file could not be decoded.
    #[error("Failed to parse hyperparameter file '{file}': {source}")]
    Config {
        source: toml::de::Error,
        file: String,
    },
}

fn list_diagnostics(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(|e| format!(" - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Innermost error, looking through [`Error::Instantiation`] wrappers.
    ///
    /// ```rust
    /// # use hygrammar::Error;
    /// let err = Error::Instantiation {
    ///     expression: "leaf".into(),
    ///     source: Box::new(Error::UnknownName("leaf".into())),
    /// };
    /// assert!(err.cause().is_unknown_name());
    /// ```
    pub fn cause(&self) -> &Error {
        match self {
            Error::Instantiation { source, .. } => source.cause(),
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
