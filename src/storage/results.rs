//! Materialized query results
//!
//! A `ResultSet` owns every row of one executed SELECT. Rows can be read as
//! positional values, as column-keyed maps or as entities, any number of
//! times, through a `Cursor` that seeks and rewinds.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::object::Entity;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `index` by column position
    pub fn indexed(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Row `index` keyed by column name
    pub fn assoc(&self, index: usize) -> Option<Map<String, Value>> {
        self.rows.get(index).map(|row| self.to_assoc(row))
    }

    pub fn assoc_rows(&self) -> Vec<Map<String, Value>> {
        self.rows.iter().map(|row| self.to_assoc(row)).collect()
    }

    /// Single cell by row index and column name
    pub fn value(&self, index: usize, column: &str) -> Option<&Value> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(index)?.get(position)
    }

    /// Every row as an entity of `type_name`
    pub fn entities(&self, type_name: &str) -> Vec<Entity> {
        self.rows
            .iter()
            .map(|row| Entity::from_record(type_name, self.to_assoc(row)))
            .collect()
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { set: self, position: 0 }
    }

    fn to_assoc(&self, row: &[Value]) -> Map<String, Value> {
        self.columns.iter().cloned().zip(row.iter().cloned()).collect()
    }
}

/// Restartable position over a `ResultSet`.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    set: &'a ResultSet,
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to row `index`; false (and no move) when out of range
    pub fn seek(&mut self, index: usize) -> bool {
        if index < self.set.len() {
            self.position = index;
            true
        } else {
            false
        }
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn next_assoc(&mut self) -> Option<Map<String, Value>> {
        let row = self.set.assoc(self.position)?;
        self.position += 1;
        Some(row)
    }

    pub fn next_entity(&mut self, type_name: &str) -> Option<Entity> {
        self.next_assoc().map(|record| Entity::from_record(type_name, record))
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = &'a [Value];

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.set.indexed(self.position)?;
        self.position += 1;
        Some(row)
    }
}
