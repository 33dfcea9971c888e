//! Declarative schema model
//!
//! Tables are described once, as data, and turned into CREATE or ALTER
//! statements by comparing the declaration with the live database.

mod column;
mod dialect;
mod model;
mod table;

pub use column::{ColumnDef, ColumnType, DefaultValue, FkAction, ForeignKey};
pub use dialect::Dialect;
pub use model::DataModel;
pub use table::{SchemaAction, TableModel};
