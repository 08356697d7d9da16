//! `@`-expression and mustache-style text template engine (spec §4.4).
//!
//! Rendering runs in two passes: the expression layer ([`expr`]) resolves
//! `@param`/`@config`/`@tool`/`@resource`/`@prompt` forms through a
//! [`Backend`], then the result is run through the mustache-subset text
//! layer ([`mustache`]). [`TemplateEngine::render`] is the single entry
//! point that does both, in order.

pub mod backend;
pub mod engine;
pub mod expr;
pub mod mustache;
pub mod rendering;

pub use backend::Backend;
pub use engine::TemplateEngine;
pub use expr::{Expr, ResourceTarget, Segment};
pub use rendering::{render_content, render_value};
