//! Fluent query builder
//!
//! A `QueryBuilder` collects conditions, ordering and a limit for one object
//! type and compiles them to a SELECT against that type's view or shadow
//! table. Execution is lazy: the first read runs the query and keeps the
//! rows; any later change to the query drops them.

use serde_json::Value;

use super::clause::{Condition, Glue, WhereClause};
use super::operator::Operator;
use super::order::{Direction, OrderBy};
use crate::model::TypeModel;
use crate::object::Entity;
use crate::storage::{ObjectStore, ResultSet};
use crate::view::from_target;
use crate::{Error, Result};

#[derive(Debug, Clone)]
enum QueryState {
    Building,
    Executed(ResultSet),
}

pub struct QueryBuilder<'a> {
    store: &'a ObjectStore,
    model: &'a TypeModel,
    preview: bool,
    filter: WhereClause,
    order: OrderBy,
    limit: Option<u64>,
    state: QueryState,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(store: &'a ObjectStore, model: &'a TypeModel) -> Self {
        Self {
            store,
            model,
            preview: store.options().preview,
            filter: WhereClause::new(),
            order: OrderBy::default(),
            limit: None,
            state: QueryState::Building,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.model.name
    }

    fn invalidate(&mut self) {
        self.state = QueryState::Building;
    }

    fn check_field(&self, field: &str) -> Result<()> {
        if self.model.has_column(field) {
            Ok(())
        } else {
            Err(Error::UnknownField {
                type_name: self.model.name.clone(),
                field: field.to_string(),
            })
        }
    }

    // ========== Conditions ==========

    /// Add `field <operator> args`, joined to the previous condition with AND
    /// unless `or()` was called
    pub fn filter(&mut self, field: &str, operator: Operator, args: Vec<Value>) -> Result<&mut Self> {
        self.check_field(field)?;
        let condition = Condition::new(field, operator, args)?;
        self.filter.push(condition);
        self.invalidate();
        Ok(self)
    }

    /// String form: `"age__gte"`, or a bare field name for equality.
    /// `"and"` / `"or"` set the glue instead.
    pub fn apply(&mut self, expression: &str, args: Vec<Value>) -> Result<&mut Self> {
        match expression {
            "and" => return Ok(self.and()),
            "or" => return Ok(self.or()),
            _ => {}
        }
        let (field, operator) = match expression.split_once("__") {
            Some((field, op)) => (field, op.parse::<Operator>()?),
            None => (expression, Operator::Eq),
        };
        self.filter(field, operator, args)
    }

    pub fn eq(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Eq, vec![value.into()])
    }

    pub fn ne(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Ne, vec![value.into()])
    }

    pub fn gt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Gt, vec![value.into()])
    }

    pub fn gte(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Gte, vec![value.into()])
    }

    pub fn lt(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Lt, vec![value.into()])
    }

    pub fn lte(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Lte, vec![value.into()])
    }

    pub fn like(&mut self, field: &str, pattern: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Like, vec![pattern.into()])
    }

    pub fn regexp(&mut self, field: &str, pattern: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Regexp, vec![pattern.into()])
    }

    pub fn between(&mut self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Result<&mut Self> {
        self.filter(field, Operator::Between, vec![low.into(), high.into()])
    }

    /// `field IN (...)`; an empty list matches nothing
    pub fn is_in<I, V>(&mut self, field: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(field, Operator::In, values.into_iter().map(Into::into).collect())
    }

    pub fn and(&mut self) -> &mut Self {
        self.filter.glue(Glue::And);
        self.invalidate();
        self
    }

    pub fn or(&mut self) -> &mut Self {
        self.filter.glue(Glue::Or);
        self.invalidate();
        self
    }

    pub fn start_group(&mut self) -> &mut Self {
        self.filter.start_group();
        self.invalidate();
        self
    }

    pub fn end_group(&mut self) -> Result<&mut Self> {
        self.filter.end_group()?;
        self.invalidate();
        Ok(self)
    }

    // ========== Options ==========

    pub fn order_by(&mut self, field: &str, direction: Direction) -> Result<&mut Self> {
        self.check_field(field)?;
        self.order.push(field, direction);
        self.invalidate();
        Ok(self)
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self.invalidate();
        self
    }

    /// Read through the preview relations, where pending values win
    pub fn preview(&mut self, preview: bool) -> &mut Self {
        self.preview = preview;
        self.invalidate();
        self
    }

    // ========== SQL ==========

    pub fn where_sql(&self) -> Result<String> {
        self.filter.render(self.store.database().dialect())
    }

    pub fn to_sql(&self) -> Result<String> {
        let mut sql = format!(
            "SELECT * FROM {}",
            from_target(&self.model.name, self.preview, self.store.options().shadow_tables)
        );
        let filter = self.where_sql()?;
        if !filter.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&filter);
        }
        if let Some(order) = self.order.render() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!("\nLIMIT {}", limit));
        }
        Ok(sql)
    }

    // ========== Results ==========

    pub fn is_executed(&self) -> bool {
        matches!(self.state, QueryState::Executed(_))
    }

    /// Rows of the query, running it only if not already run
    pub fn results(&mut self) -> Result<&ResultSet> {
        if let QueryState::Building = self.state {
            let sql = self.to_sql()?;
            let rows = self.store.database().query(&sql, [])?;
            tracing::debug!("{} rows from {}", rows.len(), self.model.name);
            self.state = QueryState::Executed(rows);
        }
        match &self.state {
            QueryState::Executed(rows) => Ok(rows),
            QueryState::Building => unreachable!("query executed above"),
        }
    }

    pub fn count(&mut self) -> Result<usize> {
        Ok(self.results()?.len())
    }

    pub fn first(&mut self) -> Result<Option<Entity>> {
        let type_name = self.model.name.clone();
        Ok(self
            .results()?
            .assoc(0)
            .map(|record| Entity::from_record(type_name, record)))
    }

    pub fn entities(&mut self) -> Result<Vec<Entity>> {
        let type_name = self.model.name.clone();
        Ok(self.results()?.entities(&type_name))
    }

    /// Ids of every matching object, in result order
    pub fn ids(&mut self) -> Result<Vec<u64>> {
        Ok(self
            .results()?
            .cursor()
            .filter_map(|row| row.first().and_then(crate::object::value_to_u64))
            .collect())
    }
}
