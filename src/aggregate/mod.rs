//! Aggregation pipelines and map-reduce.

mod exec;
mod map_reduce;
mod parse;
mod types;

pub use exec::run_pipeline;
pub use map_reduce::{MapReduce, run_map_reduce};
pub use parse::parse_pipeline;
pub use types::{Accumulator, Expr, GroupSpec, Stage, UnwindSpec};
