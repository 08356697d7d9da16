//! vMCP Composer (spec §4.6): aggregates one vMCP's upstreams and custom
//! definitions into a single MCP surface, resolving name collisions and
//! dispatching calls to whichever side actually owns them.

pub mod dispatch;
pub mod merge;
pub mod snapshot;
pub mod types;

pub use dispatch::{build_context, Composer};
pub use snapshot::Snapshot;
pub use types::{CustomResource, EnvOverrides, Origin, ResourceContent, ReverseEntry, ToolArguments, Vmcp};
