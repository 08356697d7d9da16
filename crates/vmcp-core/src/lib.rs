//! Shared foundation for the vMCP aggregator: ids, the invocation context,
//! the §7 error taxonomy, and the usage-log/blob-store interfaces the core
//! consumes but does not implement.

pub mod blob;
pub mod context;
pub mod error;
pub mod ids;
pub mod usage;

pub use context::{EnvMap, EnvValue, InvocationContext, MemoCache, NestedKind};
pub use error::{ErrorId, ErrorKind, VmcpError};
pub use ids::{ServerId, VmcpId};
