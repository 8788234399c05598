//! Typed query, update and aggregation expressions for the shale document
//! store, parsed once from loosely-typed BSON documents.

mod filter;
mod pipeline;
mod projection;
mod sort;
mod update;

pub use filter::{Condition, Filter, FilterParseError, Operator, parse_filter};
pub use pipeline::{
    Accumulator, Expr, Group, PipelineParseError, Stage, coerce_limit, parse_expr, parse_pipeline,
};
pub use projection::{IDENTITY_FIELDS, Projection};
pub use sort::{Sort, SortDirection, parse_sort};
pub use update::{Update, UpdateOp, UpdateParseError, parse_update};
