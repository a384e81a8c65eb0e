//! Token-bounded summaries of goals, habits and journal history for the
//! text-generation backends.

pub mod builder;
pub mod tokens;

pub use builder::{BoundedContext, ContextBuilder, SectionCounts, EMPTY_CONTEXT};
pub use tokens::estimate_tokens;
