//! SQL execution gateway
//!
//! `Database` wraps a master connection and an optional read-only replica.
//! Plain reads go to the replica; writes, and every statement issued while a
//! transaction is open, go to the master.

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Params};
use serde_json::Value;

use super::results::ResultSet;
use crate::schema::Dialect;
use crate::Result;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub struct Database {
    master: Connection,
    replica: Option<Connection>,
    in_transaction: Cell<bool>,
}

impl Database {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let master = Connection::open(path)?;
        Self::configure(&master)?;
        Ok(Self {
            master,
            replica: None,
            in_transaction: Cell::new(false),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let master = Connection::open_in_memory()?;
        Self::configure(&master)?;
        Ok(Self {
            master,
            replica: None,
            in_transaction: Cell::new(false),
        })
    }

    /// Route plain reads to a read-only connection on `path`
    pub fn with_replica(mut self, path: &Path) -> Result<Self> {
        let replica = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Self::configure(&replica)?;
        tracing::debug!("Reading through replica {}", path.display());
        self.replica = Some(replica);
        Ok(self)
    }

    fn configure(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.create_scalar_function(
            "regexp",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let pattern: Arc<Regex> =
                    ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> { Ok(Regex::new(vr.as_str()?)?) })?;
                let text = match ctx.get_raw(1) {
                    ValueRef::Null => return Ok(None),
                    ValueRef::Integer(i) => i.to_string(),
                    ValueRef::Real(f) => f.to_string(),
                    ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
                };
                Ok(Some(pattern.is_match(&text)))
            },
        )?;
        Ok(())
    }

    /// Dialect of the statements this gateway executes
    pub fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    pub fn has_replica(&self) -> bool {
        self.replica.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    fn reader(&self) -> &Connection {
        match &self.replica {
            Some(replica) if !self.in_transaction.get() => replica,
            _ => &self.master,
        }
    }

    // ========== Statements ==========

    /// Run a write statement on the master; returns the affected row count
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        tracing::debug!("{}", sql);
        Ok(self.master.execute(sql, params)?)
    }

    /// Run an INSERT and return the generated row id
    pub fn insert<P: Params>(&self, sql: &str, params: P) -> Result<u64> {
        self.execute(sql, params)?;
        Ok(self.master.last_insert_rowid() as u64)
    }

    /// Run a SELECT and materialize every row
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<ResultSet> {
        tracing::debug!("{}", sql);
        let mut stmt = self.reader().prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let rows = stmt
            .query_map(params, |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(value_from_sql))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ResultSet::new(columns, rows))
    }

    /// Map the first row with `f`, if there is one
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::debug!("{}", sql);
        self.reader().query_row(sql, params, f).optional().map_err(Into::into)
    }

    /// First column of the first row, if any
    pub fn query_scalar<P: Params>(&self, sql: &str, params: P) -> Result<Option<Value>> {
        tracing::debug!("{}", sql);
        self.reader()
            .query_row(sql, params, |row| row.get_ref(0).map(value_from_sql))
            .optional()
            .map_err(Into::into)
    }

    /// Raw bytes of the first column of the first row
    pub fn query_blob<P: Params>(&self, sql: &str, params: P) -> Result<Option<Vec<u8>>> {
        let blob: Option<Option<Vec<u8>>> = self
            .reader()
            .query_row(sql, params, |row| row.get(0))
            .optional()?;
        Ok(blob.flatten())
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .reader()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Transactions ==========

    pub fn begin(&self) -> Result<()> {
        self.master.execute_batch(self.dialect().begin_transaction())?;
        self.in_transaction.set(true);
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.master.execute_batch("COMMIT")?;
        self.in_transaction.set(false);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.in_transaction.set(false);
        self.master.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// on any error
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        self.begin()?;
        let result = f(self).and_then(|value| self.commit().map(|_| value));
        if result.is_err() && !self.master.is_autocommit() {
            if let Err(e) = self.rollback() {
                tracing::warn!("Rollback failed: {}", e);
            }
        }
        self.in_transaction.set(false);
        result
    }

    // ========== Introspection ==========

    /// Whether a table or view named `name` exists
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let found: Option<i64> = self
            .master
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Live column names of `table`, or `None` when it does not exist
    pub fn live_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        if !self.table_exists(table)? {
            return Ok(None);
        }
        let mut stmt = self.master.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(Some(columns))
    }
}

/// Convert a SQLite cell to JSON
pub(crate) fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL)", [])
            .unwrap();
        db
    }

    #[test]
    fn test_insert_and_query() {
        let db = sample_db();
        let id = db.insert("INSERT INTO t (name, score) VALUES (?1, ?2)", rusqlite::params!["Ann", 1.5]).unwrap();
        assert_eq!(id, 1);

        let set = db.query("SELECT id, name, score FROM t", []).unwrap();
        assert_eq!(set.columns(), &["id", "name", "score"]);
        assert_eq!(set.assoc(0).unwrap()["score"], json!(1.5));
        assert_eq!(db.count("t").unwrap(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = sample_db();
        let result: Result<()> = db.transaction(|db| {
            db.execute("INSERT INTO t (name) VALUES ('kept?')", [])?;
            db.execute("INSERT INTO missing_table VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!db.in_transaction());
        assert_eq!(db.count("t").unwrap(), 0);

        db.transaction(|db| db.execute("INSERT INTO t (name) VALUES ('kept')", []))
            .unwrap();
        assert_eq!(db.count("t").unwrap(), 1);
    }

    #[test]
    fn test_regexp_function() {
        let db = sample_db();
        db.execute("INSERT INTO t (name, score) VALUES ('alpha', 12), ('beta', 7)", [])
            .unwrap();
        let set = db.query("SELECT name FROM t WHERE name REGEXP '^a'", []).unwrap();
        assert_eq!(set.len(), 1);
        let set = db.query("SELECT name FROM t WHERE score REGEXP '^1'", []).unwrap();
        assert_eq!(set.value(0, "name"), Some(&json!("alpha")));
    }

    #[test]
    fn test_introspection() {
        let db = sample_db();
        assert!(db.table_exists("t").unwrap());
        assert!(!db.table_exists("nope").unwrap());
        assert_eq!(
            db.live_columns("t").unwrap(),
            Some(vec!["id".to_string(), "name".to_string(), "score".to_string()])
        );
        assert_eq!(db.live_columns("nope").unwrap(), None);
    }

    #[test]
    fn test_replica_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        let db = Database::open(&path).unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", []).unwrap();
        db.execute("INSERT INTO t (name) VALUES ('Ann')", []).unwrap();

        let db = db.with_replica(&path).unwrap();
        assert!(db.has_replica());
        assert_eq!(db.query("SELECT name FROM t", []).unwrap().len(), 1);
        assert!(db.execute("INSERT INTO t (name) VALUES ('Bob')", []).is_ok());

        db.transaction(|db| {
            db.execute("INSERT INTO t (name) VALUES ('Cy')", [])?;
            // the uncommitted row is visible because reads stay on the master
            assert_eq!(db.query("SELECT name FROM t", [])?.len(), 3);
            Ok(())
        })
        .unwrap();
    }
}
