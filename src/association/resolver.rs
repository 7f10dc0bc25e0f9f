use super::{Association, RelationKind};
use crate::core::{Result, Value};
use crate::entity::Record;
use crate::facade::TemporalDb;
use crate::storage::Filter;
use crate::temporal::TemporalScope;

/// Loads the records an association currently points at, honoring the
/// requested temporal scope. Junction-mediated kinds return target records
/// with their junction record attached.
pub fn related(
    db: &TemporalDb,
    owner: &Record,
    association: &Association,
    scope: &TemporalScope,
) -> Result<Vec<Record>> {
    let owner_key_column = association
        .primary_key
        .as_deref()
        .unwrap_or(owner.descriptor().key_column());
    let owner_key = owner.get(owner_key_column);
    if owner_key.is_null() {
        return Ok(Vec::new());
    }

    match association.kind {
        RelationKind::OwningOne | RelationKind::OwningMany => {
            let mut records = db.fetch(
                &association.target,
                scope,
                &[Filter::eq(&association.foreign_key, owner_key)],
            )?;
            if association.kind.is_singular() {
                records.truncate(1);
            }
            Ok(records)
        }
        RelationKind::OwnedOne => {
            let foreign_value = owner.get(&association.foreign_key);
            if foreign_value.is_null() {
                return Ok(Vec::new());
            }
            let target = db.registry().descriptor(&association.target)?;
            let match_column = association
                .related_primary_key
                .as_deref()
                .unwrap_or(target.key_column())
                .to_string();
            let mut records = db.fetch(
                &association.target,
                scope,
                &[Filter::eq(match_column, foreign_value)],
            )?;
            records.truncate(1);
            Ok(records)
        }
        RelationKind::ManyToMany | RelationKind::OneThrough | RelationKind::ManyThrough => {
            let junction = association.junction.as_deref().ok_or_else(|| {
                crate::core::CascadeError::Configuration(format!(
                    "association '{}' requires a junction",
                    association.name
                ))
            })?;
            let junction_records = db.fetch(
                &junction.target,
                scope,
                &[Filter::eq(&association.foreign_key, owner_key)],
            )?;

            let target = db.registry().descriptor(&association.target)?;
            let match_column = junction
                .related_primary_key
                .as_deref()
                .unwrap_or(target.key_column())
                .to_string();

            let mut records = Vec::new();
            for junction_record in junction_records {
                let target_key = junction_record.get(&junction.foreign_key);
                if target_key == Value::Null {
                    continue;
                }
                for mut record in db.fetch(
                    &association.target,
                    scope,
                    &[Filter::eq(match_column.clone(), target_key.clone())],
                )? {
                    if association.kind == RelationKind::ManyToMany {
                        record.set_junction(junction_record.clone());
                    }
                    records.push(record);
                }
            }
            if association.kind.is_singular() {
                records.truncate(1);
            }
            Ok(records)
        }
    }
}
