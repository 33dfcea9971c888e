//! Terminal output for the CLI

pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, record, section, success, summary_row, warn};
pub use table::{results_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
