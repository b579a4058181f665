//! Update specifications: compilation, positional resolution and atomic application.

mod apply;
mod parse;
mod positional;
mod types;

pub use apply::apply_update;
pub use parse::parse_update_json;
pub use types::{DateKind, Modifier, ModifierOp, PopEnd, PullCriteria, PushSpec, UpdateSpec};

pub(crate) use apply::set_path;
