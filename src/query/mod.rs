//! Query builder
//!
//! Compiles typed filter chains into SQL over the per-type relations:
//! - `operator`: comparison operators, arity and literal rendering
//! - `clause`: WHERE assembly with implicit AND and explicit groups
//! - `order`: ORDER BY entries
//! - `builder`: the fluent `QueryBuilder` with lazy, cached execution

pub mod builder;
pub mod clause;
pub mod operator;
pub mod order;

pub use builder::QueryBuilder;
pub use clause::{Condition, Glue, WhereClause};
pub use operator::{Arity, Operator};
pub use order::{Direction, OrderBy};
pub use crate::storage::{Cursor, ResultSet};
