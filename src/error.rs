use thiserror::Error;

use crate::dtype::DType;

/// Errors raised while walking a parameter tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A struct-like companion (or a companion leaf standing where the root
    /// has a container) cannot supply a child the root has.
    #[error("structural mismatch at `{path}`: companion {companion} has no field `{key}`")]
    StructuralMismatch {
        path: String,
        key: String,
        companion: usize,
    },

    #[error("node at `{path}` is neither a leaf nor a recognised container")]
    InvalidNode { path: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DTypeError {
    #[error("element {index} ({value}) is not representable as {target}")]
    Unrepresentable {
        index: usize,
        value: String,
        target: DType,
    },

    #[error("unknown dtype `{0}`")]
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    DType(#[from] DTypeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid initialiser: {0}")]
    Init(String),

    #[error("model hook failed: {0}")]
    Model(String),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
