use super::EntityDescriptor;
use crate::core::{DataType, Result, Row, Value};
use crate::storage::Filter;
use crate::temporal::Timestamp;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One in-memory row of an entity, tracked against the attribute values it
/// was loaded with. `original` is what the stored row looked like at load or
/// last save; the diff against it drives dirtiness and history snapshots.
#[derive(Debug, Clone)]
pub struct Record {
    descriptor: Arc<EntityDescriptor>,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    exists: bool,
    relations: BTreeMap<String, Vec<Record>>,
    junction: Option<Box<Record>>,
}

impl Record {
    pub fn new(descriptor: Arc<EntityDescriptor>) -> Self {
        Self {
            descriptor,
            attributes: BTreeMap::new(),
            original: BTreeMap::new(),
            exists: false,
            relations: BTreeMap::new(),
            junction: None,
        }
    }

    pub fn from_row(descriptor: Arc<EntityDescriptor>, row: &Row) -> Self {
        let mut record = Self::new(descriptor.clone());
        for (column, cell) in descriptor.full_columns().iter().zip(row.iter()) {
            record.attributes.insert(column.name.clone(), cell.clone());
        }
        record.original = record.attributes.clone();
        record.exists = true;
        record
    }

    pub fn to_row(&self) -> Row {
        self.descriptor
            .full_columns()
            .iter()
            .map(|c| self.get(&c.name))
            .collect()
    }

    pub fn descriptor(&self) -> &Arc<EntityDescriptor> {
        &self.descriptor
    }

    pub fn entity_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn get(&self, column: &str) -> Value {
        self.attributes.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn original(&self, column: &str) -> Value {
        self.original.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.attributes.insert(column.into(), value);
    }

    /// Assign a batch of attributes, coercing anything destined for a
    /// timestamp column into epoch milliseconds.
    pub fn fill(&mut self, values: BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in values {
            let coerced = if self.is_timestamp_column(&name) {
                match Timestamp::coerce(&value)? {
                    Some(ts) => ts.value(),
                    None => Value::Null,
                }
            } else {
                value
            };
            self.attributes.insert(name, coerced);
        }
        Ok(())
    }

    fn is_timestamp_column(&self, name: &str) -> bool {
        let temporal = self.descriptor.temporal();
        name == temporal.start_column
            || name == temporal.end_column
            || name == temporal.created_column
            || self
                .descriptor
                .columns()
                .iter()
                .any(|c| c.name == name && c.data_type == DataType::Timestamp)
    }

    pub fn key(&self) -> Value {
        self.get(self.descriptor.key_column())
    }

    pub fn set_key(&mut self, value: Value) {
        let column = self.descriptor.key_column().to_string();
        self.attributes.insert(column, value);
    }

    pub fn valid_from(&self) -> Result<Option<Timestamp>> {
        Timestamp::from_value(&self.get(&self.descriptor.temporal().start_column))
    }

    pub fn valid_to(&self) -> Result<Option<Timestamp>> {
        Timestamp::from_value(&self.get(&self.descriptor.temporal().end_column))
    }

    pub fn created_at(&self) -> Result<Option<Timestamp>> {
        Timestamp::from_value(&self.get(&self.descriptor.temporal().created_column))
    }

    pub fn set_valid_from(&mut self, ts: Timestamp) {
        let column = self.descriptor.temporal().start_column.clone();
        self.attributes.insert(column, ts.value());
    }

    pub fn set_valid_to(&mut self, ts: Timestamp) {
        let column = self.descriptor.temporal().end_column.clone();
        self.attributes.insert(column, ts.value());
    }

    pub fn set_created_at(&mut self, ts: Timestamp) {
        let column = self.descriptor.temporal().created_column.clone();
        self.attributes.insert(column, ts.value());
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn mark_exists(&mut self) {
        self.exists = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes != self.original
    }

    pub fn dirty_columns(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(value))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// A record whose validity interval is closed is soft deleted.
    pub fn trashed(&self) -> Result<bool> {
        let max = self.descriptor.temporal().max_timestamp;
        Ok(match self.valid_to()? {
            Some(end) => end < max,
            None => false,
        })
    }

    fn identity_string(&self) -> String {
        self.descriptor
            .identity_columns()
            .iter()
            .map(|c| self.get(c).to_string())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Identity of the logical record, ignoring versions.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}", self.descriptor.name(), self.identity_string())
    }

    /// Identity of one specific version of the record.
    pub fn temporal_fingerprint(&self) -> Result<String> {
        let start = self
            .valid_from()?
            .map(|ts| ts.as_millis().to_string())
            .unwrap_or_default();
        Ok(format!("{}|{}", self.fingerprint(), start))
    }

    /// Filters locating this record's active stored row: the identity values
    /// it was loaded with plus an open validity interval.
    pub fn save_predicate(&self) -> Vec<Filter> {
        let temporal = self.descriptor.temporal();
        let mut filters: Vec<Filter> = self
            .descriptor
            .identity_columns()
            .iter()
            .map(|c| Filter::eq(c, self.original(c)))
            .collect();
        filters.push(Filter::eq(
            &temporal.end_column,
            temporal.max_timestamp.value(),
        ));
        filters
    }

    /// Snapshot of the record as it looked before the current change, with
    /// the validity interval it covered.
    pub fn historic_clone(&self, valid_from: Timestamp, deleted_at: Timestamp) -> Self {
        let mut clone = Self::new(self.descriptor.clone());
        clone.attributes = self.original.clone();
        clone.set_valid_from(valid_from);
        clone.set_valid_to(deleted_at);
        clone
    }

    pub fn relations(&self) -> &BTreeMap<String, Vec<Record>> {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&[Record]> {
        self.relations.get(name).map(|r| r.as_slice())
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Vec<Record>> {
        self.relations.get_mut(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.relations.insert(name.into(), records);
    }

    pub fn take_relations(&mut self) -> BTreeMap<String, Vec<Record>> {
        std::mem::take(&mut self.relations)
    }

    pub fn junction(&self) -> Option<&Record> {
        self.junction.as_deref()
    }

    pub fn junction_mut(&mut self) -> Option<&mut Record> {
        self.junction.as_deref_mut()
    }

    pub fn set_junction(&mut self, junction: Record) {
        self.junction = Some(Box::new(junction));
    }

    pub fn take_junction(&mut self) -> Option<Record> {
        self.junction.take().map(|b| *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::temporal::END_OF_TIME;

    fn descriptor() -> Arc<EntityDescriptor> {
        Arc::new(
            EntityDescriptor::new("users")
                .with_column("name", DataType::Text)
                .with_column("email", DataType::Text),
        )
    }

    #[test]
    fn round_trips_through_rows() {
        let desc = descriptor();
        let mut record = Record::new(desc.clone());
        record.set("id", Value::Integer(1));
        record.set("name", Value::Text("ada".into()));
        record.set_valid_from(Timestamp::from_millis(1_000));
        record.set_valid_to(END_OF_TIME);
        record.set_created_at(Timestamp::from_millis(1_000));

        let row = record.to_row();
        let restored = Record::from_row(desc, &row);
        assert_eq!(restored.key(), Value::Integer(1));
        assert_eq!(restored.get("name"), Value::Text("ada".into()));
        assert!(restored.exists());
        assert!(!restored.is_dirty());
    }

    #[test]
    fn dirtiness_tracks_original() {
        let desc = descriptor();
        let row = vec![
            Value::Integer(1),
            Value::Text("ada".into()),
            Value::Text("a@x".into()),
            Value::Integer(1_000),
            END_OF_TIME.value(),
            Value::Integer(1_000),
        ];
        let mut record = Record::from_row(desc, &row);
        assert!(!record.is_dirty());
        record.set("name", Value::Text("grace".into()));
        assert!(record.is_dirty());
        assert_eq!(record.dirty_columns(), vec!["name".to_string()]);
        record.sync_original();
        assert!(!record.is_dirty());
    }

    #[test]
    fn trashed_follows_end_column() {
        let desc = descriptor();
        let mut record = Record::new(desc);
        record.set_valid_to(END_OF_TIME);
        assert!(!record.trashed().unwrap());
        record.set_valid_to(Timestamp::from_millis(5_000));
        assert!(record.trashed().unwrap());
    }

    #[test]
    fn historic_clone_uses_original_attributes() {
        let desc = descriptor();
        let mut record = Record::new(desc);
        record.set("id", Value::Integer(7));
        record.set("name", Value::Text("old".into()));
        record.set_valid_from(Timestamp::from_millis(1_000));
        record.set_valid_to(END_OF_TIME);
        record.sync_original();
        record.set("name", Value::Text("new".into()));

        let snapshot =
            record.historic_clone(Timestamp::from_millis(1_000), Timestamp::from_millis(2_000));
        assert_eq!(snapshot.get("name"), Value::Text("old".into()));
        assert_eq!(
            snapshot.valid_to().unwrap(),
            Some(Timestamp::from_millis(2_000))
        );
    }
}
