//! Query compilation and evaluation, projections and cursors.

mod compare;
mod cursor;
mod eval;
mod parse;
mod path;
mod projection;
mod types;

pub use compare::{compare_bson, compare_for_query, documents_equal, type_bracket, values_equal};
pub use cursor::Cursor;
pub use eval::{compare_candidates, compare_docs, eval_filter};
pub use parse::{IntoFilter, check_path, parse_filter_json, parse_sort};
pub use path::{Candidate, first_candidate, lookup, parse_index, resolve, resolve_value};
pub use projection::Projection;
pub use types::{
    BsonKind, CmpOp, Condition, ElemMatch, Filter, FindOptions, Literal, Operator, Order, Pattern,
    SortSpec,
};

pub(crate) use compare::{as_f64, as_i64, is_numeric};
pub(crate) use eval::condition_holds;
pub(crate) use types::MAX_ARRAY_PADDING;
