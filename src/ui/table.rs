use tabled::builder::Builder;
use tabled::{settings::Style, Table, Tabled};

use super::output::cell_text;
use crate::storage::ResultSet;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// Query rows as a table, one column per result column
pub fn results_table(results: &ResultSet) -> String {
    let mut builder = Builder::default();
    builder.push_record(results.columns().iter().cloned());
    for row in results.rows() {
        builder.push_record(row.iter().map(cell_text));
    }
    builder.build().with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stats_table() {
        assert!(stats_table(&[]).is_empty());
        let table = stats_table(&[("Objects", "3".to_string())]);
        assert!(table.contains("Metric"));
        assert!(table.contains("Objects"));
    }

    #[test]
    fn test_results_table() {
        let results = ResultSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![json!(1), json!("Ann")]],
        );
        let table = results_table(&results);
        assert!(table.contains("name"));
        assert!(table.contains("Ann"));
    }
}
