use crate::association::AssociationRegistry;
use crate::core::{CascadeError, Result, Value};
use crate::engine::{
    TraversalContext, cascade_delete, cascade_restore, cascade_save, newest_closed,
    restore_record, update_all_history,
};
use crate::entity::{EntityDescriptor, Record};
use crate::storage::{Filter, InMemoryStorage};
use crate::temporal::{TemporalScope, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// The public face of the store: registration plus payload driven save,
/// delete and restore. Every mutating call runs one traversal with a single
/// clock, so an owner and everything it cascades into carry the same
/// interval start.
///
/// The `_at` variants take an explicit instant; the plain variants use the
/// wall clock.
pub struct TemporalDb {
    registry: AssociationRegistry,
    storage: InMemoryStorage,
}

impl TemporalDb {
    pub fn new() -> Self {
        Self {
            registry: AssociationRegistry::new(),
            storage: InMemoryStorage::new(),
        }
    }

    /// Registers an entity and creates its backing table. Registration is
    /// rejected once any lookup has sealed the registry.
    pub fn register(&self, descriptor: EntityDescriptor) -> Result<Arc<EntityDescriptor>> {
        let descriptor = self.registry.register(descriptor)?;
        self.storage.create_table(descriptor.table_schema())?;
        debug!(entity = descriptor.name(), "registered entity");
        Ok(descriptor)
    }

    pub(crate) fn registry(&self) -> &AssociationRegistry {
        &self.registry
    }

    pub(crate) fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }

    /// Saves a payload: creates or updates the addressed record, cascades
    /// into its nested associations, and writes history for every interval
    /// that moved.
    pub fn save(&self, entity: &str, payload: &serde_json::Value) -> Result<Record> {
        self.save_at(entity, payload, Timestamp::now())
    }

    pub fn save_at(
        &self,
        entity: &str,
        payload: &serde_json::Value,
        now: Timestamp,
    ) -> Result<Record> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut record = self.root_record(&descriptor, payload)?;
        let mut ctx = TraversalContext::at(now);
        cascade_save(self, &mut record, payload, &mut ctx, false)?;
        let mut history_ctx = TraversalContext::at(now);
        update_all_history(self, &mut record, &mut history_ctx)?;
        Ok(record)
    }

    fn root_record(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        let serde_json::Value::Object(map) = payload else {
            return Err(CascadeError::Validation(
                "save payload must be an object".to_string(),
            ));
        };

        let key = map
            .get(descriptor.key_column())
            .map(Value::from_json)
            .transpose()?
            .filter(|v| !v.is_null());

        let mut record = match &key {
            Some(key) => self
                .find_scoped(descriptor.name(), key, &TemporalScope::Active)?
                .unwrap_or_else(|| Record::new(descriptor.clone())),
            None => Record::new(descriptor.clone()),
        };

        let mut scalars = BTreeMap::new();
        for (name, value) in map {
            if descriptor.has_column(name) {
                scalars.insert(name.clone(), Value::from_json(value)?);
            }
        }
        record.fill(scalars)?;
        Ok(record)
    }

    /// Active record with the given key.
    pub fn find(&self, entity: &str, key: &Value) -> Result<Option<Record>> {
        self.find_scoped(entity, key, &TemporalScope::Active)
    }

    pub fn find_scoped(
        &self,
        entity: &str,
        key: &Value,
        scope: &TemporalScope,
    ) -> Result<Option<Record>> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut records = self.fetch(
            entity,
            scope,
            &[Filter::eq(descriptor.key_column(), key.clone())],
        )?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    /// Records matching the scope plus any extra filters, in storage order.
    pub fn query(
        &self,
        entity: &str,
        scope: &TemporalScope,
        extra: &[Filter],
    ) -> Result<Vec<Record>> {
        self.fetch(entity, scope, extra)
    }

    pub fn count(&self, entity: &str, scope: &TemporalScope) -> Result<usize> {
        Ok(self.fetch(entity, scope, &[])?.len())
    }

    /// Every stored version of one identity, oldest interval first.
    pub fn history(&self, entity: &str, key: &Value) -> Result<Vec<Record>> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut records = self.fetch(
            entity,
            &TemporalScope::WithTrashed,
            &[Filter::eq(descriptor.key_column(), key.clone())],
        )?;
        records.sort_by_key(|r| {
            r.valid_from()
                .ok()
                .flatten()
                .map(|ts| ts.as_millis())
                .unwrap_or(i64::MIN)
        });
        Ok(records)
    }

    /// Loads the records an association of a loaded record points at.
    pub fn related(
        &self,
        record: &Record,
        association: &str,
        scope: &TemporalScope,
    ) -> Result<Vec<Record>> {
        let association = record.descriptor().association(association)?.clone();
        crate::association::related(self, record, &association, scope)
    }

    /// Soft deletes a record and cascades per the declared policies. False
    /// when no active record carries the key.
    pub fn delete(&self, entity: &str, key: &Value) -> Result<bool> {
        self.delete_at(entity, key, Timestamp::now())
    }

    pub fn delete_at(&self, entity: &str, key: &Value, now: Timestamp) -> Result<bool> {
        let Some(mut record) = self.find(entity, key)? else {
            return Ok(false);
        };
        let mut ctx = TraversalContext::at(now);
        cascade_delete(self, &mut record, &mut ctx)?;
        Ok(true)
    }

    /// Physically removes the active row, leaving history in place.
    pub fn force_delete(&self, entity: &str, key: &Value) -> Result<bool> {
        let descriptor = self.registry.descriptor(entity)?;
        let temporal = descriptor.temporal();
        let removed = self.storage.delete_where(
            entity,
            &[
                Filter::eq(descriptor.key_column(), key.clone()),
                Filter::eq(&temporal.end_column, temporal.max_timestamp),
            ],
        )?;
        Ok(removed > 0)
    }

    /// Physically removes every stored version of the given keys.
    pub fn force_destroy(&self, entity: &str, keys: &[Value]) -> Result<usize> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut removed = 0;
        for key in keys {
            removed += self
                .storage
                .delete_where(entity, &[Filter::eq(descriptor.key_column(), key.clone())])?;
        }
        Ok(removed)
    }

    /// Reopens a soft deleted record from its newest closed version, pulling
    /// records deleted in the same instant back with it. None when the key
    /// is already active or has no history.
    pub fn restore(&self, entity: &str, key: &Value) -> Result<Option<Record>> {
        self.restore_at(entity, key, Timestamp::now())
    }

    pub fn restore_at(
        &self,
        entity: &str,
        key: &Value,
        now: Timestamp,
    ) -> Result<Option<Record>> {
        if self.find(entity, key)?.is_some() {
            return Ok(None);
        }
        let Some(closed) = newest_closed(self, entity, key)? else {
            return Ok(None);
        };
        let mut ctx = TraversalContext::at(now);
        let deleted_at = closed.valid_to()?.unwrap_or(now);
        let revived = restore_record(self, &closed, &mut ctx)?;
        ctx.visit(revived.fingerprint());
        cascade_restore(self, &revived, deleted_at, &mut ctx)?;
        Ok(Some(revived))
    }

    /// Finds a record matching the payload's attributes, restoring it when
    /// only a closed version exists, and creates it otherwise.
    pub fn restore_or_create(
        &self,
        entity: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        self.restore_or_create_at(entity, payload, Timestamp::now())
    }

    pub fn restore_or_create_at(
        &self,
        entity: &str,
        payload: &serde_json::Value,
        now: Timestamp,
    ) -> Result<Record> {
        let descriptor = self.registry.descriptor(entity)?;
        let filters = self.attribute_filters(&descriptor, payload)?;

        let mut active = self.fetch(entity, &TemporalScope::Active, &filters)?;
        if !active.is_empty() {
            return Ok(active.remove(0));
        }

        let mut closed = self.fetch(entity, &TemporalScope::OnlyTrashed, &filters)?;
        closed.sort_by_key(|r| {
            r.valid_to()
                .ok()
                .flatten()
                .map(|ts| ts.as_millis())
                .unwrap_or(i64::MIN)
        });
        if let Some(newest) = closed.pop()
            && let Some(revived) = self.restore_at(entity, &newest.key(), now)?
        {
            return Ok(revived);
        }

        self.save_at(entity, payload, now)
    }

    /// Creates from the payload, falling back to restore when the insert
    /// collides with a stored identity.
    pub fn create_or_restore(
        &self,
        entity: &str,
        payload: &serde_json::Value,
    ) -> Result<Record> {
        self.create_or_restore_at(entity, payload, Timestamp::now())
    }

    pub fn create_or_restore_at(
        &self,
        entity: &str,
        payload: &serde_json::Value,
        now: Timestamp,
    ) -> Result<Record> {
        match self.save_at(entity, payload, now) {
            Ok(record) => Ok(record),
            Err(err) if err.is_conflict() => {
                self.restore_or_create_at(entity, payload, now)
            }
            Err(err) => Err(err),
        }
    }

    fn attribute_filters(
        &self,
        descriptor: &Arc<EntityDescriptor>,
        payload: &serde_json::Value,
    ) -> Result<Vec<Filter>> {
        let serde_json::Value::Object(map) = payload else {
            return Err(CascadeError::Validation(
                "payload must be an object".to_string(),
            ));
        };
        let mut filters = Vec::new();
        for column in descriptor.columns() {
            if let Some(value) = map.get(&column.name) {
                filters.push(Filter::eq(column.name.clone(), Value::from_json(value)?));
            }
        }
        Ok(filters)
    }

    pub(crate) fn fetch(
        &self,
        entity: &str,
        scope: &TemporalScope,
        extra: &[Filter],
    ) -> Result<Vec<Record>> {
        let descriptor = self.registry.descriptor(entity)?;
        let mut filters = scope.filters(descriptor.temporal(), Some(descriptor.key_column()));
        filters.extend_from_slice(extra);
        let rows = self.storage.select(entity, &filters)?;
        Ok(rows
            .iter()
            .map(|row| Record::from_row(descriptor.clone(), row))
            .collect())
    }

    pub(crate) fn insert_record_row(&self, record: &Record) -> Result<usize> {
        self.storage
            .insert_row(record.entity_name(), record.to_row())
    }

    pub(crate) fn update_record_row(
        &self,
        record: &Record,
        predicate: &[Filter],
    ) -> Result<usize> {
        let matched = self
            .storage
            .select_with_ids(record.entity_name(), predicate)?;
        let row = record.to_row();
        let mut updated = 0;
        for (id, _) in matched {
            if self.storage.update_row(record.entity_name(), id, row.clone())? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

impl Default for TemporalDb {
    fn default() -> Self {
        Self::new()
    }
}
