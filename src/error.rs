//! Error taxonomy.
//!
//! Only [`ConfigurationError`] ever reaches the caller of [`Form::new`](crate::form::Form::new):
//! a schema that cannot be composed aborts mounting entirely. Failed validation is a
//! normal outcome (`invalid` plus `errors`) and never shows up here. Broken
//! cross-references and failed item loaders stay local to the element that owns them.

use thiserror::Error;

/// Convenient result type for composition and mounting.
pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// A schema that cannot be turned into a working form.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The descriptor names an element kind with no recipe.
    #[error("unknown element type `{kind}` at `{path}`")]
    UnknownKind { kind: String, path: String },

    /// A rule specification could not be parsed.
    #[error("malformed rule specification `{spec}`: {reason}")]
    MalformedRule { spec: String, reason: String },

    /// A rule name is not present in the rule registry.
    #[error("unknown validation rule `{name}` at `{path}`")]
    UnknownRule { name: String, path: String },

    /// Two elements resolved to the same path.
    #[error("duplicate element path `{0}`")]
    DuplicatePath(String),

    /// The descriptor is structurally wrong (missing nested schema, bad option type...).
    #[error("invalid descriptor at `{path}`: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    /// A conditions expression could not be understood.
    #[error("invalid conditions at `{path}`: {reason}")]
    InvalidConditions { path: String, reason: String },

    /// The schema or a locale table is not valid JSON for the expected shape.
    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),
}

/// A cross-field rule or conditions leaf referenced a path with no element.
///
/// Never propagated: the referenced value is treated as absent and the error is logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{from}` references missing element `{path}`")]
pub struct ResolutionError {
    /// Path of the element holding the reference.
    pub from: String,
    /// The unresolved reference.
    pub path: String,
}

/// An async `items` loader rejected.
///
/// Stored on the owning element; its option list becomes empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("items loader for `{path}` failed: {reason}")]
pub struct AsyncSourceError {
    /// Path of the element whose loader failed.
    pub path: String,
    /// The loader's rejection reason.
    pub reason: String,
}
