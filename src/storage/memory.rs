use super::{Filter, Table, TableSchema};
use crate::core::{CascadeError, Result, Row, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Named tables with individual locks. Everything here is synchronous; the
/// layer above assumes single-writer-per-call-chain semantics, so the locks
/// only guard structural integrity, not transactional isolation.
pub struct InMemoryStorage {
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();
        let mut tables = self.tables.write()?;

        if tables.contains_key(&name) {
            return Err(CascadeError::TableExists(name));
        }

        tables.insert(name, Arc::new(RwLock::new(Table::new(schema))));
        Ok(())
    }

    pub fn drop_table(&self, table_name: &str) -> Result<()> {
        if self.tables.write()?.remove(table_name).is_none() {
            return Err(CascadeError::TableNotFound(table_name.to_string()));
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<RwLock<Table>>> {
        self.tables
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| CascadeError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables
            .read()
            .map(|tables| tables.contains_key(name))
            .unwrap_or(false)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.read()?.keys().cloned().collect())
    }

    pub fn insert_row(&self, table_name: &str, row: Row) -> Result<usize> {
        let handle = self.table(table_name)?;
        let mut table = handle.write()?;
        table.insert(row)
    }

    pub fn update_row(&self, table_name: &str, id: usize, row: Row) -> Result<bool> {
        let handle = self.table(table_name)?;
        let mut table = handle.write()?;
        table.update(id, row)
    }

    pub fn remove_row(&self, table_name: &str, id: usize) -> Result<bool> {
        let handle = self.table(table_name)?;
        let mut table = handle.write()?;
        Ok(table.remove(id).is_some())
    }

    pub fn select(&self, table_name: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        let handle = self.table(table_name)?;
        let table = handle.read()?;
        table.select(filters)
    }

    pub fn select_with_ids(
        &self,
        table_name: &str,
        filters: &[Filter],
    ) -> Result<Vec<(usize, Row)>> {
        let handle = self.table(table_name)?;
        let table = handle.read()?;
        table.select_with_ids(filters)
    }

    pub fn delete_where(&self, table_name: &str, filters: &[Filter]) -> Result<usize> {
        let handle = self.table(table_name)?;
        let mut table = handle.write()?;
        table.delete_where(filters)
    }

    pub fn max_value(&self, table_name: &str, column: &str) -> Result<Option<Value>> {
        let handle = self.table(table_name)?;
        let table = handle.read()?;
        table.max_value(column)
    }

    pub fn row_count(&self, table_name: &str) -> Result<usize> {
        let handle = self.table(table_name)?;
        let table = handle.read()?;
        Ok(table.row_count())
    }

    pub fn get_schema(&self, table_name: &str) -> Result<TableSchema> {
        let handle = self.table(table_name)?;
        let table = handle.read()?;
        Ok(table.schema().clone())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
