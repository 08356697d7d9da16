//! Custom Tool Engines (spec §4.5): Script, HTTP, and Prompt.
//!
//! Each engine exposes `execute`/`render` plus a shared `describe` that
//! turns a [`CustomToolDef`] into the [`ToolDescriptor`] the Composer
//! advertises through `list_tools`.

pub mod http;
pub mod prompt;
pub mod script;
pub mod types;

pub use http::HttpEngine;
pub use prompt::PromptEngine;
pub use script::ScriptEngine;
pub use types::{CustomToolDef, HttpAuthBinding, HttpToolDef, PromptToolDef, ResponseKind, ScriptToolDef};

use vmcp_protocol::types::ToolDescriptor;

pub fn describe(def: &CustomToolDef) -> ToolDescriptor {
    ToolDescriptor {
        name: def.name().to_string(),
        description: def.description().map(str::to_string),
        input_schema: def.input_schema().clone(),
    }
}
