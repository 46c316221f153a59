//! Lowering registry: operator identities, call binding and the error taxonomy.

mod call;
mod error;
mod identity;
mod registry;

pub use call::{CallArg, OpCall};
pub use error::{LowerError, LowerResult};
pub use identity::{IdentityParseError, OperatorIdentity};
pub use registry::{BindingStatus, Lowering, LoweringFn, LoweringRegistry};
