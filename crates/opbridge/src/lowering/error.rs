use thiserror::Error;

use super::identity::{IdentityParseError, OperatorIdentity};

/// Failures surfaced by the registry and by lowering implementations.
#[derive(Debug, Error)]
pub enum LowerError {
    /// No binding exists for the identity.
    #[error("no lowering is registered for {0}")]
    UnboundOperator(OperatorIdentity),
    /// The identity is known but intentionally has no lowering yet.
    #[error("{identity} is not lowered yet: {reason}")]
    NotLowered {
        identity: OperatorIdentity,
        reason: String,
    },
    #[error("{identity} is already bound to '{existing}', cannot rebind to '{attempted}'")]
    DuplicateBinding {
        identity: OperatorIdentity,
        existing: String,
        attempted: String,
    },
    #[error(transparent)]
    InvalidIdentity(#[from] IdentityParseError),
    /// The call does not fit the operator's signature.
    #[error("invalid call to {identity}: {message}")]
    InvalidArgument {
        identity: OperatorIdentity,
        message: String,
    },
    /// A primitive rejected its operands while the subgraph was being built.
    #[error("graph construction failed: {0:#}")]
    Graph(#[from] anyhow::Error),
}

impl LowerError {
    pub fn invalid_argument(identity: &OperatorIdentity, message: impl Into<String>) -> Self {
        LowerError::InvalidArgument {
            identity: identity.clone(),
            message: message.into(),
        }
    }

    pub fn is_not_lowered(&self) -> bool {
        matches!(self, LowerError::NotLowered { .. })
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, LowerError::UnboundOperator(_))
    }
}

pub type LowerResult<T> = Result<T, LowerError>;
