use super::versioning::{close_record, persist_record, restore_record, update_all_history};
use super::TraversalContext;
use crate::association::{related, resolve_all, Association, CascadeAction, RelationKind};
use crate::core::{CascadeError, Result, Value};
use crate::entity::Record;
use crate::facade::TemporalDb;
use crate::storage::Filter;
use crate::temporal::{TemporalScope, Timestamp};
use std::collections::HashSet;

/// Saves a record and everything its payload links to, depth first. Records
/// the owner holds the key for are saved before the owner; everything else
/// after. `force_stamp` restamps a clean record so its interval follows the
/// caller's. The saved relation tree is left on the record for the history
/// pass.
pub(crate) fn cascade_save(
    db: &TemporalDb,
    record: &mut Record,
    payload: &serde_json::Value,
    ctx: &mut TraversalContext,
    force_stamp: bool,
) -> Result<()> {
    let mut resolved = resolve_all(db, record, payload)?;
    let pre_existed = record.exists();

    let relations_dirty = resolved.iter().any(|r| {
        r.detach_missing || r.targets.iter().any(|t| !t.exists() || t.is_dirty())
    });

    // Records the owner points at come first so their keys exist when the
    // owner's row is written. Detached owned records are remembered for the
    // delete policy below, after the fk is already cleared.
    let mut detached_owned: Vec<(Association, Vec<Record>)> = Vec::new();
    for r in &mut resolved {
        if r.association.kind != RelationKind::OwnedOne {
            continue;
        }
        if r.detach_missing {
            let current = related(db, record, &r.association, &TemporalScope::Active)?;
            record.set(&r.association.foreign_key, Value::Null);
            if r.association.on_delete == CascadeAction::Cascade {
                detached_owned.push((r.association.clone(), current));
            }
            continue;
        }
        if let (Some(target), Some(item)) = (r.targets.first_mut(), r.payloads.first()) {
            let item = item.clone();
            cascade_save(db, target, &item, ctx, false)?;
            let target_column = r
                .association
                .related_primary_key
                .clone()
                .unwrap_or_else(|| target.descriptor().key_column().to_string());
            record.set(r.association.foreign_key.clone(), target.get(&target_column));
        }
    }

    let stamped = persist_record(db, record, ctx, force_stamp || relations_dirty)?;
    ctx.visit(record.fingerprint());

    let mut handled: HashSet<String> = HashSet::new();
    for mut r in resolved {
        handled.insert(r.association.name.clone());
        if r.association.kind == RelationKind::OwnedOne {
            if !r.detach_missing {
                let name = r.association.name.clone();
                record.set_relation(name, std::mem::take(&mut r.targets));
            }
            continue;
        }
        if r.detach_missing {
            detach_all(db, record, &r.association, ctx)?;
            continue;
        }

        let owner_key = record.get(
            r.association
                .primary_key
                .as_deref()
                .unwrap_or(record.descriptor().key_column()),
        );

        match r.association.kind {
            RelationKind::OwningOne | RelationKind::OwningMany => {
                for (target, item) in r.targets.iter_mut().zip(r.payloads.iter()) {
                    target.set(r.association.foreign_key.clone(), owner_key.clone());
                    cascade_save(db, target, item, ctx, stamped)?;
                }
            }
            RelationKind::ManyToMany => {
                for (target, item) in r.targets.iter_mut().zip(r.payloads.iter()) {
                    cascade_save(db, target, item, ctx, false)?;
                    let junction =
                        upsert_junction(db, record, &r.association, target, ctx, stamped)?;
                    target.set_junction(junction);
                }
            }
            _ => {}
        }
        let name = r.association.name.clone();
        record.set_relation(name, std::mem::take(&mut r.targets));
    }

    for (association, targets) in detached_owned {
        for mut target in targets {
            cascade_delete(db, &mut target, ctx)?;
            match record.relation_mut(&association.name) {
                Some(list) => list.push(target),
                None => record.set_relation(association.name.clone(), vec![target]),
            }
        }
    }

    if stamped && pre_existed {
        touch_related(db, record, ctx, &handled)?;
    }
    Ok(())
}

/// Finds or creates the active junction row linking owner and target. An
/// existing row is restamped only when the owner moved, so a no-op save
/// leaves the junction untouched.
fn upsert_junction(
    db: &TemporalDb,
    owner: &Record,
    association: &Association,
    target: &Record,
    ctx: &mut TraversalContext,
    owner_stamped: bool,
) -> Result<Record> {
    let junction = association.junction.as_deref().ok_or_else(|| {
        CascadeError::Configuration(format!(
            "association '{}' requires a junction",
            association.name
        ))
    })?;
    let junction_descriptor = db.registry().descriptor(&junction.target)?;

    let owner_key = owner.get(
        association
            .primary_key
            .as_deref()
            .unwrap_or(owner.descriptor().key_column()),
    );
    let target_column = junction
        .related_primary_key
        .as_deref()
        .unwrap_or(target.descriptor().key_column());
    let target_key = target.get(target_column);

    let existing = db.fetch(
        &junction.target,
        &TemporalScope::Active,
        &[
            Filter::eq(&association.foreign_key, owner_key.clone()),
            Filter::eq(&junction.foreign_key, target_key.clone()),
        ],
    )?;

    let mut row = match existing.into_iter().next() {
        Some(found) => found,
        None => {
            let mut fresh = Record::new(junction_descriptor);
            fresh.set(&association.foreign_key, owner_key);
            fresh.set(&junction.foreign_key, target_key);
            fresh
        }
    };
    persist_record(db, &mut row, ctx, owner_stamped)?;
    ctx.visit(row.fingerprint());
    Ok(row)
}

/// Pulls every record an association still points at into the traversal
/// after the owner's interval moved, restamping each so the whole graph
/// shares one instant. Associations already written through the payload are
/// skipped; the visited set stops back edges.
fn touch_related(
    db: &TemporalDb,
    record: &mut Record,
    ctx: &mut TraversalContext,
    skip: &HashSet<String>,
) -> Result<()> {
    let associations: Vec<Association> = record
        .descriptor()
        .associations()
        .iter()
        .filter(|a| !a.kind.is_through() && !skip.contains(&a.name))
        .cloned()
        .collect();

    for association in associations {
        let mut touched = Vec::new();
        for mut rel in related(db, record, &association, &TemporalScope::Active)? {
            if let Some(junction) = rel.junction_mut()
                && !ctx.seen(&junction.fingerprint())
                && junction.valid_from()? != Some(ctx.now)
            {
                persist_record(db, junction, ctx, true)?;
                let fingerprint = junction.fingerprint();
                ctx.visit(fingerprint);
            }
            if ctx.seen(&rel.fingerprint()) {
                continue;
            }
            if rel.valid_from()? == Some(ctx.now) {
                continue;
            }
            persist_record(db, &mut rel, ctx, true)?;
            ctx.visit(rel.fingerprint());
            touch_related(db, &mut rel, ctx, &HashSet::new())?;
            touched.push(rel);
        }
        if !touched.is_empty() {
            record.set_relation(association.name.clone(), touched);
        }
    }
    Ok(())
}

/// Undoes every current link of an association, applying its delete policy.
/// The owner itself stays; this backs a payload that is present but empty.
pub(crate) fn detach_all(
    db: &TemporalDb,
    owner: &mut Record,
    association: &Association,
    ctx: &mut TraversalContext,
) -> Result<()> {
    match association.kind {
        RelationKind::OwningOne | RelationKind::OwningMany => {
            let mut affected = Vec::new();
            for mut target in related(db, owner, association, &TemporalScope::Active)? {
                match association.on_delete {
                    CascadeAction::Cascade => cascade_delete(db, &mut target, ctx)?,
                    CascadeAction::SetNull => {
                        target.set(association.foreign_key.clone(), Value::Null);
                        persist_record(db, &mut target, ctx, false)?;
                        ctx.visit(target.fingerprint());
                        update_all_history(db, &mut target, ctx)?;
                    }
                    CascadeAction::NoAction => {}
                }
                affected.push(target);
            }
            owner.set_relation(association.name.clone(), affected);
        }
        RelationKind::ManyToMany => {
            detach_junctions(db, owner, association, ctx)?;
        }
        RelationKind::OwnedOne => {
            // handled before the owner's row is written
        }
        _ => {}
    }
    Ok(())
}

fn delete_action(association: &Association) -> CascadeAction {
    match &association.junction {
        Some(junction) if junction.on_delete != CascadeAction::NoAction => junction.on_delete,
        _ => association.on_delete,
    }
}

fn detach_junctions(
    db: &TemporalDb,
    owner: &Record,
    association: &Association,
    ctx: &mut TraversalContext,
) -> Result<()> {
    let junction = association.junction.as_deref().ok_or_else(|| {
        CascadeError::Configuration(format!(
            "association '{}' requires a junction",
            association.name
        ))
    })?;
    let owner_key = owner.get(
        association
            .primary_key
            .as_deref()
            .unwrap_or(owner.descriptor().key_column()),
    );
    let rows = db.fetch(
        &junction.target,
        &TemporalScope::Active,
        &[Filter::eq(&association.foreign_key, owner_key)],
    )?;
    for mut row in rows {
        match delete_action(association) {
            CascadeAction::Cascade => cascade_delete(db, &mut row, ctx)?,
            CascadeAction::SetNull => {
                row.set(association.foreign_key.clone(), Value::Null);
                persist_record(db, &mut row, ctx, false)?;
                ctx.visit(row.fingerprint());
                update_all_history(db, &mut row, ctx)?;
            }
            CascadeAction::NoAction => {}
        }
    }
    Ok(())
}

/// Soft deletes a record and walks its delete policies: owned foreign keys
/// are cleared before the row closes, owning and junction records are
/// closed or unlinked after.
pub(crate) fn cascade_delete(
    db: &TemporalDb,
    record: &mut Record,
    ctx: &mut TraversalContext,
) -> Result<()> {
    if !ctx.visit(record.fingerprint()) {
        return Ok(());
    }
    if record.trashed()? {
        return Ok(());
    }

    let associations: Vec<Association> = record
        .descriptor()
        .associations()
        .iter()
        .filter(|a| !a.kind.is_through() && delete_action(a) != CascadeAction::NoAction)
        .cloned()
        .collect();

    // Related sets are captured while the row is still active; closing it
    // first would make them unreachable through the active scope.
    let mut preloaded = Vec::new();
    for association in &associations {
        if association.kind == RelationKind::ManyToMany {
            continue;
        }
        let targets = related(db, record, association, &TemporalScope::Active)?;
        preloaded.push((association.clone(), targets));
    }

    for association in &associations {
        if association.kind == RelationKind::OwnedOne
            && association.on_delete == CascadeAction::SetNull
        {
            record.set(association.foreign_key.clone(), Value::Null);
        }
    }

    close_record(db, record, ctx)?;
    update_all_history(db, record, ctx)?;

    for association in &associations {
        if association.kind == RelationKind::ManyToMany {
            detach_junctions(db, record, association, ctx)?;
        }
    }

    for (association, targets) in preloaded {
        for mut target in targets {
            match (association.kind, association.on_delete) {
                (RelationKind::OwnedOne, CascadeAction::Cascade)
                | (RelationKind::OwningOne, CascadeAction::Cascade)
                | (RelationKind::OwningMany, CascadeAction::Cascade) => {
                    cascade_delete(db, &mut target, ctx)?;
                }
                (RelationKind::OwningOne, CascadeAction::SetNull)
                | (RelationKind::OwningMany, CascadeAction::SetNull) => {
                    target.set(association.foreign_key.clone(), Value::Null);
                    persist_record(db, &mut target, ctx, false)?;
                    ctx.visit(target.fingerprint());
                    update_all_history(db, &mut target, ctx)?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Reopens records that were closed in the same instant as their restored
/// owner, following Cascade edges only.
pub(crate) fn cascade_restore(
    db: &TemporalDb,
    record: &Record,
    deleted_at: Timestamp,
    ctx: &mut TraversalContext,
) -> Result<()> {
    let associations: Vec<Association> = record
        .descriptor()
        .associations()
        .iter()
        .filter(|a| !a.kind.is_through() && delete_action(a) == CascadeAction::Cascade)
        .cloned()
        .collect();

    for association in associations {
        match association.kind {
            RelationKind::OwningOne | RelationKind::OwningMany | RelationKind::OwnedOne => {
                for closed in related(db, record, &association, &TemporalScope::TrashedOn(deleted_at))? {
                    if !ctx.visit(closed.fingerprint()) {
                        continue;
                    }
                    let child_deleted_at = match closed.valid_to()? {
                        Some(ts) => ts,
                        None => continue,
                    };
                    let revived = restore_record(db, &closed, ctx)?;
                    cascade_restore(db, &revived, child_deleted_at, ctx)?;
                }
            }
            RelationKind::ManyToMany => {
                let junction = association.junction.as_deref().ok_or_else(|| {
                    CascadeError::Configuration(format!(
                        "association '{}' requires a junction",
                        association.name
                    ))
                })?;
                let owner_key = record.get(
                    association
                        .primary_key
                        .as_deref()
                        .unwrap_or(record.descriptor().key_column()),
                );
                let rows = db.fetch(
                    &junction.target,
                    &TemporalScope::TrashedOn(deleted_at),
                    &[Filter::eq(&association.foreign_key, owner_key)],
                )?;
                for closed in rows {
                    if !ctx.visit(closed.fingerprint()) {
                        continue;
                    }
                    restore_record(db, &closed, ctx)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}
