//! Collections of tables planned as one migration

use std::collections::HashMap;

use super::table::{SchemaAction, TableModel};
use super::Dialect;
use crate::Result;

/// An ordered set of tables plus statements to run after a table is created.
#[derive(Debug, Clone, Default)]
pub struct DataModel {
    pub dialect: Dialect,
    tables: Vec<TableModel>,
    initializers: HashMap<String, Vec<String>>,
}

impl DataModel {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: Vec::new(),
            initializers: HashMap::new(),
        }
    }

    /// Add a table; a table with the same name is replaced in place
    pub fn add_table(&mut self, table: TableModel) -> &mut Self {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(slot) => *slot = table,
            None => self.tables.push(table),
        }
        self
    }

    /// Statements that run only when `table` is freshly created
    pub fn add_table_queries<I, S>(&mut self, table: &str, queries: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initializers
            .entry(table.to_string())
            .or_default()
            .extend(queries.into_iter().map(Into::into));
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableModel> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> &[TableModel] {
        &self.tables
    }

    /// Plan each table against the live database.
    ///
    /// `introspect` returns the live column names of a table, or `None` when
    /// the table does not exist. CREATE/ALTER statements come first, in table
    /// order, followed by the initializers of every table that was created.
    pub fn plan<F>(&self, mut introspect: F) -> Result<Vec<String>>
    where
        F: FnMut(&str) -> Result<Option<Vec<String>>>,
    {
        let mut statements = Vec::new();
        let mut initializers = Vec::new();

        for table in &self.tables {
            let live = introspect(&table.name)?;
            let action = table.plan(live.as_deref(), self.dialect);
            if let SchemaAction::Create(_) = action {
                if let Some(queries) = self.initializers.get(&table.name) {
                    initializers.extend(queries.iter().cloned());
                }
            }
            statements.extend(action.statements().iter().cloned());
        }

        statements.extend(initializers);
        Ok(statements)
    }
}
