use super::TraversalContext;
use crate::core::{CascadeError, Result, Value};
use crate::entity::{EntityDescriptor, KeyType, Record};
use crate::facade::TemporalDb;
use crate::temporal::TemporalScope;
use tracing::warn;

/// Writes a record's own row. New records get a generated key and a fresh
/// validity interval; existing records are restamped and updated in place
/// only when something changed. `force_stamp` restamps a clean record, used
/// when a cascade needs the owner's interval to move with its relations.
/// Returns whether a row was written.
pub(crate) fn persist_record(
    db: &TemporalDb,
    record: &mut Record,
    ctx: &mut TraversalContext,
    force_stamp: bool,
) -> Result<bool> {
    if !record.exists() {
        if record.key().is_null() {
            let key = next_key(db, record.descriptor())?;
            record.set_key(key);
        } else if let Some(active) = db
            .fetch(
                record.entity_name(),
                &TemporalScope::Active,
                &[crate::storage::Filter::eq(
                    record.descriptor().key_column(),
                    record.key(),
                )],
            )?
            .into_iter()
            .next()
        {
            // An explicit key on a fresh record must not open a second
            // interval for an identity that is still active.
            return Err(CascadeError::Conflict {
                entity: record.entity_name().to_string(),
                identity: record.key().to_string(),
                valid_from: active
                    .valid_from()?
                    .map(|ts| ts.as_millis())
                    .unwrap_or_default(),
            });
        }
        record.set_valid_from(ctx.now);
        record.set_valid_to(record.descriptor().temporal().max_timestamp);
        if record.created_at()?.is_none() {
            record.set_created_at(ctx.now);
        }
        db.insert_record_row(record)?;
        record.mark_exists();
        return Ok(true);
    }

    if !record.is_dirty() && !force_stamp {
        return Ok(false);
    }

    record.set_valid_from(ctx.now);
    let predicate = record.save_predicate();
    let updated = db.update_record_row(record, &predicate)?;
    if updated == 0 {
        return Err(CascadeError::ExecutionError(format!(
            "no active row found for '{}' while saving",
            record.fingerprint()
        )));
    }
    Ok(true)
}

/// Generates a key for a new record. Integer keys continue the sequence
/// across every stored version, historical rows included, so a restored or
/// re-created record never reuses an old key.
pub(crate) fn next_key(db: &TemporalDb, descriptor: &EntityDescriptor) -> Result<Value> {
    match descriptor.key_type() {
        KeyType::Int => {
            let max = db
                .storage()
                .max_value(descriptor.name(), descriptor.key_column())?;
            let next = match max {
                Some(value) => value.as_i64().unwrap_or(0) + 1,
                None => 1,
            };
            Ok(Value::Integer(next))
        }
        KeyType::Str => Ok(Value::Text(uuid::Uuid::new_v4().to_string())),
        KeyType::Provided => Err(CascadeError::Validation(format!(
            "entity '{}' requires an explicit key",
            descriptor.name()
        ))),
    }
}

/// Closes the record's active row in place: both interval columns move to
/// the traversal instant, leaving a zero-width closed row. The snapshot
/// covering the old interval is written by the history pass that follows.
pub(crate) fn close_record(
    db: &TemporalDb,
    record: &mut Record,
    ctx: &mut TraversalContext,
) -> Result<()> {
    let predicate = record.save_predicate();
    record.set_valid_to(ctx.now);
    record.set_valid_from(ctx.now);
    let updated = db.update_record_row(record, &predicate)?;
    if updated == 0 {
        return Err(CascadeError::ExecutionError(format!(
            "no active row found for '{}' while deleting",
            record.fingerprint()
        )));
    }
    Ok(())
}

/// Walks a saved record tree and writes a historical snapshot for every
/// record whose interval moved, then re-baselines each record. Junctions are
/// snapshotted before the record that carries them. A snapshot colliding
/// with an already stored version at the same instant is logged and skipped;
/// the stored version stays authoritative.
pub(crate) fn update_all_history(
    db: &TemporalDb,
    record: &mut Record,
    ctx: &mut TraversalContext,
) -> Result<()> {
    let fingerprint = record.temporal_fingerprint()?;
    if !ctx.visit(fingerprint) {
        return Ok(());
    }

    save_historic(db, record, ctx)?;
    record.sync_original();

    let names: Vec<String> = record.relations().keys().cloned().collect();
    for name in names {
        let mut children = match record.relation_mut(&name) {
            Some(children) => std::mem::take(children),
            None => Vec::new(),
        };
        for child in &mut children {
            if let Some(junction) = child.junction_mut() {
                let junction_fingerprint = junction.temporal_fingerprint()?;
                if ctx.visit(junction_fingerprint) {
                    save_historic(db, junction, ctx)?;
                    junction.sync_original();
                }
            }
            update_all_history(db, child, ctx)?;
        }
        record.set_relation(name, children);
    }
    Ok(())
}

fn save_historic(db: &TemporalDb, record: &Record, ctx: &TraversalContext) -> Result<()> {
    let old = match crate::temporal::Timestamp::from_value(
        &record.original(&record.descriptor().temporal().start_column),
    )? {
        Some(ts) => ts,
        None => return Ok(()),
    };
    let current = match record.valid_from()? {
        Some(ts) => ts,
        None => return Ok(()),
    };
    if old == current {
        return Ok(());
    }

    let snapshot = record.historic_clone(old, ctx.now);
    match db.insert_record_row(&snapshot) {
        Ok(_) => Ok(()),
        Err(err) if err.is_conflict() => {
            warn!(
                entity = record.entity_name(),
                identity = %record.fingerprint(),
                valid_from = old.as_millis(),
                "historical version already stored, keeping existing row"
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Reopens a soft deleted record from a closed version the caller located.
/// An identity that already has an active row keeps it: that row is updated
/// in place with the restored attributes, so one identity never holds two
/// open intervals.
pub(crate) fn restore_record(
    db: &TemporalDb,
    closed: &Record,
    ctx: &mut TraversalContext,
) -> Result<Record> {
    let descriptor = closed.descriptor();
    let active = db
        .fetch(
            closed.entity_name(),
            &TemporalScope::Active,
            &[crate::storage::Filter::eq(
                descriptor.key_column(),
                closed.key(),
            )],
        )?
        .into_iter()
        .next();

    if let Some(mut current) = active {
        let predicate = current.save_predicate();
        for column in descriptor.columns() {
            current.set(column.name.clone(), closed.get(&column.name));
        }
        current.set_valid_from(ctx.now);
        current.set_valid_to(descriptor.temporal().max_timestamp);
        let updated = db.update_record_row(&current, &predicate)?;
        if updated == 0 {
            return Err(CascadeError::ExecutionError(format!(
                "no active row found for '{}' while restoring",
                current.fingerprint()
            )));
        }
        current.sync_original();
        return Ok(current);
    }

    let mut revived = closed.clone();
    revived.set_valid_from(ctx.now);
    revived.set_valid_to(closed.descriptor().temporal().max_timestamp);
    db.insert_record_row(&revived)?;
    revived.mark_exists();
    revived.sync_original();
    Ok(revived)
}

/// Newest closed version of an identity, by the instant it stopped being
/// valid and then by the interval start.
pub(crate) fn newest_closed(
    db: &TemporalDb,
    entity: &str,
    key: &Value,
) -> Result<Option<Record>> {
    let descriptor = db.registry().descriptor(entity)?;
    let mut closed = db.fetch(
        entity,
        &TemporalScope::OnlyTrashed,
        &[crate::storage::Filter::eq(descriptor.key_column(), key.clone())],
    )?;
    closed.sort_by_key(|r| {
        let end = r
            .valid_to()
            .ok()
            .flatten()
            .map(|ts| ts.as_millis())
            .unwrap_or(i64::MIN);
        let start = r
            .valid_from()
            .ok()
            .flatten()
            .map(|ts| ts.as_millis())
            .unwrap_or(i64::MIN);
        (end, start)
    });
    Ok(closed.pop())
}
