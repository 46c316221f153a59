use thiserror::Error;

use crate::ir::DType;
use crate::lowering::{IdentityParseError, LowerError, OperatorIdentity};

/// Configuration defects in the descriptor table or the catalogue as a whole.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("descriptor '{name}' (variant {variant:?}) is already catalogued")]
    DuplicateDescriptor {
        name: String,
        variant: Option<String>,
    },
    #[error("descriptor '{0}' has an empty dtype set")]
    EmptyDTypeSet(String),
    #[error("descriptor '{name}' lists {dtype}, which the conformance runner does not support")]
    DTypeOutsideUniverse { name: String, dtype: DType },
    #[error("no descriptor named '{0}'")]
    UnknownOperator(String),
    /// A descriptor exercises an identity with neither a lowering nor an acknowledged gap.
    #[error("descriptor '{name}' exercises {identity}, which has no binding")]
    UnresolvedDescriptor {
        name: String,
        identity: OperatorIdentity,
    },
    #[error(transparent)]
    InvalidIdentity(#[from] IdentityParseError),
    #[error("failed to build the lowering registry: {0}")]
    Registry(#[from] LowerError),
    /// Process-wide catalogue construction failed earlier; carries the original message.
    #[error("operator catalogue failed to initialise: {0}")]
    Initialization(String),
}
