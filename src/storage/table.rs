use crate::core::{CascadeError, Column, Result, Row, Schema, Value};
use crate::storage::Filter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    /// Composite uniqueness constraint: at most one row may share the same
    /// values across these columns. Entities use (identity, valid_from).
    unique: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
            unique: Vec::new(),
        }
    }

    pub fn with_unique(mut self, columns: Vec<String>) -> Self {
        self.unique = columns;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn unique(&self) -> &[String] {
        &self.unique
    }
}

/// Schema-validated row store. Rows are addressed by an internal id that
/// never leaves the storage layer; callers select and mutate through
/// filter predicates. Single writer per call chain: visibility and locking
/// for concurrent writers belong to the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<usize, Row>,
    next_row_id: usize,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn insert(&mut self, row: Row) -> Result<usize> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, None)?;

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        Ok(id)
    }

    pub fn update(&mut self, id: usize, new_row: Row) -> Result<bool> {
        if !self.rows.contains_key(&id) {
            return Ok(false);
        }
        self.validate_row(&new_row)?;
        self.check_uniqueness(&new_row, Some(id))?;
        self.rows.insert(id, new_row);
        Ok(true)
    }

    pub fn remove(&mut self, id: usize) -> Option<Row> {
        self.rows.remove(&id)
    }

    pub fn select(&self, filters: &[Filter]) -> Result<Vec<Row>> {
        let mut results = Vec::new();
        for row in self.rows.values() {
            if self.row_matches(row, filters)? {
                results.push(row.clone());
            }
        }
        Ok(results)
    }

    pub fn select_with_ids(&self, filters: &[Filter]) -> Result<Vec<(usize, Row)>> {
        let mut results = Vec::new();
        for (id, row) in &self.rows {
            if self.row_matches(row, filters)? {
                results.push((*id, row.clone()));
            }
        }
        Ok(results)
    }

    pub fn delete_where(&mut self, filters: &[Filter]) -> Result<usize> {
        let matched: Vec<usize> = self
            .select_with_ids(filters)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in &matched {
            self.rows.remove(id);
        }
        Ok(matched.len())
    }

    /// Maximum value of a column across every stored row, historical rows
    /// included. Used for sequential identity generation.
    pub fn max_value(&self, column: &str) -> Result<Option<Value>> {
        let idx = self.column_index(column)?;
        let mut max: Option<Value> = None;
        for row in self.rows.values() {
            let cell = &row[idx];
            if cell.is_null() {
                continue;
            }
            match &max {
                None => max = Some(cell.clone()),
                Some(current) => {
                    if cell.compare(current)? == std::cmp::Ordering::Greater {
                        max = Some(cell.clone());
                    }
                }
            }
        }
        Ok(max)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row_matches(&self, row: &Row, filters: &[Filter]) -> Result<bool> {
        for filter in filters {
            let idx = self.column_index(&filter.column)?;
            if !filter.matches(&row[idx])? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn column_index(&self, column: &str) -> Result<usize> {
        self.schema.schema().find_column_index(column).ok_or_else(|| {
            CascadeError::ColumnNotFound(column.to_string(), self.schema.name.clone())
        })
    }

    fn check_uniqueness(&self, row: &Row, ignore_id: Option<usize>) -> Result<()> {
        if self.schema.unique.is_empty() {
            return Ok(());
        }

        let mut indexed = Vec::with_capacity(self.schema.unique.len());
        for column in &self.schema.unique {
            indexed.push(self.column_index(column)?);
        }

        // Rows with a NULL in the unique set never conflict.
        if indexed.iter().any(|idx| row[*idx].is_null()) {
            return Ok(());
        }

        for (id, existing) in &self.rows {
            if let Some(ign) = ignore_id
                && *id == ign
            {
                continue;
            }
            if indexed.iter().all(|idx| existing[*idx] == row[*idx]) {
                let values: Vec<String> = indexed.iter().map(|idx| row[*idx].to_string()).collect();
                return Err(CascadeError::ConstraintViolation(format!(
                    "Unique constraint violation on '{}' ({}) = ({})",
                    self.schema.name,
                    self.schema.unique.join(", "),
                    values.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let columns = self.schema.schema().columns();
        if row.len() != columns.len() {
            return Err(CascadeError::ExecutionError(format!(
                "Expected {} columns, got {}",
                columns.len(),
                row.len()
            )));
        }
        for (column, value) in columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn table() -> Table {
        let schema = TableSchema::new(
            "flight",
            vec![
                Column::new("id", DataType::Integer),
                Column::new("title", DataType::Text),
                Column::new("valid_from", DataType::Timestamp),
            ],
        )
        .with_unique(vec!["id".into(), "valid_from".into()]);
        Table::new(schema)
    }

    #[test]
    fn test_unique_constraint_over_identity_and_valid_from() {
        let mut t = table();
        t.insert(vec![1i64.into(), "BA-117".into(), 1000i64.into()])
            .unwrap();
        // Same identity, different valid_from: fine.
        t.insert(vec![1i64.into(), "BA-117".into(), 2000i64.into()])
            .unwrap();
        // Exact (identity, valid_from) duplicate: rejected.
        let err = t
            .insert(vec![1i64.into(), "BA-118".into(), 2000i64.into()])
            .unwrap_err();
        assert!(matches!(err, CascadeError::ConstraintViolation(_)));
    }

    #[test]
    fn test_select_with_filters() {
        let mut t = table();
        t.insert(vec![1i64.into(), "BA-117".into(), 1000i64.into()])
            .unwrap();
        t.insert(vec![2i64.into(), "LH-400".into(), 2000i64.into()])
            .unwrap();

        let rows = t.select(&[Filter::ge("valid_from", 1500i64)]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::Text("LH-400".into()));
    }

    #[test]
    fn test_delete_where_and_max() {
        let mut t = table();
        t.insert(vec![1i64.into(), "BA-117".into(), 1000i64.into()])
            .unwrap();
        t.insert(vec![5i64.into(), "LH-400".into(), 2000i64.into()])
            .unwrap();

        assert_eq!(t.max_value("id").unwrap(), Some(Value::Integer(5)));
        assert_eq!(t.delete_where(&[Filter::eq("id", 5i64)]).unwrap(), 1);
        assert_eq!(t.row_count(), 1);
    }
}
