//! View / shadow-table builder
//!
//! Generates the per-type relations queries read from:
//! - `v_<type>` / `vp_<type>`: views pivoting attribute rows into columns
//! - `q_<type>` / `qp_<type>`: optional materialized copies of those views

mod builder;
mod catalog;

pub use builder::{from_target, shadow_name, view_name, ViewBuilder};
pub use catalog::{ViewCatalog, ViewEntry};
