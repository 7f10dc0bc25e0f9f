use crate::association::Association;
use crate::core::{CascadeError, Column, DataType, Result};
use crate::storage::TableSchema;
use crate::temporal::TemporalConfig;

/// How primary keys are generated for new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Sequential integers, max existing key + 1.
    Int,
    /// Random UUID v4 strings.
    Str,
    /// Caller supplies the key; saving without one is a validation error.
    Provided,
}

/// Static description of one entity: its attribute columns, key strategy,
/// temporal column naming, and declared associations.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    key_column: String,
    key_type: KeyType,
    columns: Vec<Column>,
    temporal: TemporalConfig,
    associations: Vec<Association>,
    unique: Option<Vec<String>>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: "id".to_string(),
            key_type: KeyType::Int,
            columns: vec![Column::new("id", DataType::Integer)],
            temporal: TemporalConfig::default(),
            associations: Vec::new(),
            unique: None,
        }
    }

    pub fn with_key(mut self, column: impl Into<String>, key_type: KeyType) -> Self {
        let column = column.into();
        let data_type = match key_type {
            KeyType::Str => DataType::Text,
            _ => DataType::Integer,
        };
        if let Some(existing) = self
            .columns
            .iter()
            .position(|c| c.name == self.key_column)
        {
            self.columns[existing] = Column::new(column.clone(), data_type);
        } else {
            self.columns.insert(0, Column::new(column.clone(), data_type));
        }
        self.key_column = column;
        self.key_type = key_type;
        self
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    pub fn with_association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalConfig) -> Self {
        self.temporal = temporal;
        self
    }

    /// Override the identity column set. Junction entities without a single
    /// key column use the pair of foreign keys instead.
    pub fn with_unique(mut self, columns: Vec<String>) -> Self {
        self.unique = Some(columns);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn temporal(&self) -> &TemporalConfig {
        &self.temporal
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Result<&Association> {
        self.associations
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| {
                CascadeError::Configuration(format!(
                    "entity '{}' has no association '{}'",
                    self.name, name
                ))
            })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
            || name == self.temporal.start_column
            || name == self.temporal.end_column
            || name == self.temporal.created_column
    }

    /// Attribute columns followed by the three temporal columns.
    pub fn full_columns(&self) -> Vec<Column> {
        let mut columns = self.columns.clone();
        columns.push(Column::new(&self.temporal.start_column, DataType::Timestamp));
        columns.push(Column::new(&self.temporal.end_column, DataType::Timestamp));
        columns.push(Column::new(&self.temporal.created_column, DataType::Timestamp));
        columns
    }

    /// Columns that identify one logical record across its versions.
    pub fn identity_columns(&self) -> Vec<String> {
        match &self.unique {
            Some(columns) => columns.clone(),
            None => vec![self.key_column.clone()],
        }
    }

    pub fn table_schema(&self) -> TableSchema {
        let mut unique = self.identity_columns();
        unique.push(self.temporal.start_column.clone());
        TableSchema::new(&self.name, self.full_columns()).with_unique(unique)
    }
}
