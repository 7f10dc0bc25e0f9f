use super::{Association, related};
use crate::core::{CascadeError, Result, Value};
use crate::entity::{EntityDescriptor, Record};
use crate::facade::TemporalDb;
use crate::temporal::TemporalScope;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One association's slice of a nested save payload, matched against the
/// records it currently points at. `payloads` keeps the raw JSON so nested
/// levels can be resolved once the targets are saved.
pub struct ResolvedAssociation {
    pub association: Association,
    pub targets: Vec<Record>,
    pub payloads: Vec<serde_json::Value>,
    /// Present but empty payloads mean every current link should be undone.
    pub detach_missing: bool,
}

/// Matches an owner's save payload against its declared associations.
/// Through relations never accept payloads; an unknown key in the payload
/// that names no attribute column and no association is a validation error.
pub fn resolve_all(
    db: &TemporalDb,
    owner: &Record,
    payload: &serde_json::Value,
) -> Result<Vec<ResolvedAssociation>> {
    let serde_json::Value::Object(map) = payload else {
        return Ok(Vec::new());
    };

    let descriptor = owner.descriptor().clone();
    for key in map.keys() {
        if !descriptor.has_column(key) && descriptor.association(key).is_err() {
            return Err(CascadeError::Validation(format!(
                "entity '{}' has no column or association '{}'",
                descriptor.name(),
                key
            )));
        }
    }

    let mut resolved = Vec::new();
    for association in descriptor.associations() {
        let Some(value) = map.get(&association.name) else {
            continue;
        };
        if association.kind.is_through() {
            return Err(CascadeError::Validation(format!(
                "association '{}' is read only",
                association.name
            )));
        }

        let payloads = collect_payloads(&association.name, value)?;
        if payloads.is_empty() {
            resolved.push(ResolvedAssociation {
                association: association.clone(),
                targets: Vec::new(),
                payloads: Vec::new(),
                detach_missing: true,
            });
            continue;
        }

        if association.kind.is_singular() && payloads.len() > 1 {
            return Err(CascadeError::Validation(format!(
                "association '{}' links at most one record",
                association.name
            )));
        }

        let existing = related(db, owner, association, &TemporalScope::Active)?;
        let target = db.registry().descriptor(&association.target)?;

        let mut targets = Vec::new();
        for item in &payloads {
            targets.push(match_target(&target, association, &existing, item)?);
        }

        resolved.push(ResolvedAssociation {
            association: association.clone(),
            targets,
            payloads,
            detach_missing: false,
        });
    }
    Ok(resolved)
}

/// Normalizes a payload value into a list of objects. Null, `[]` and `{}`
/// all mean "nothing linked"; anything else must be an object or an array
/// of objects.
fn collect_payloads(name: &str, value: &serde_json::Value) -> Result<Vec<serde_json::Value>> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        serde_json::Value::Object(_) => Ok(vec![value.clone()]),
        serde_json::Value::Array(items) => {
            for item in items {
                if !item.is_object() {
                    return Err(CascadeError::Validation(format!(
                        "association '{name}' expects objects in its payload"
                    )));
                }
            }
            Ok(items.to_vec())
        }
        _ => Err(CascadeError::Validation(format!(
            "association '{name}' expects an object or array payload"
        ))),
    }
}

/// Finds the current related record this payload addresses, or builds a
/// fresh one. Matching runs only over the records the association currently
/// points at, by the declared related key; the matched value may also come
/// from the payload's foreign key entry. A key matching nothing starts a
/// new record carrying that key.
fn match_target(
    target: &Arc<EntityDescriptor>,
    association: &Association,
    existing: &[Record],
    payload: &serde_json::Value,
) -> Result<Record> {
    let match_column = association
        .related_primary_key
        .as_deref()
        .unwrap_or_else(|| target.key_column());
    let payload_key = payload
        .get(match_column)
        .or_else(|| payload.get(&association.foreign_key))
        .map(Value::from_json)
        .transpose()?
        .filter(|v| !v.is_null());

    let mut record = match &payload_key {
        Some(key) => existing
            .iter()
            .find(|r| &r.get(match_column) == key)
            .cloned()
            .unwrap_or_else(|| Record::new(target.clone())),
        None => Record::new(target.clone()),
    };

    let serde_json::Value::Object(map) = payload else {
        return Ok(record);
    };
    let mut scalars = BTreeMap::new();
    for (name, value) in map {
        if target.association(name).is_ok() {
            continue;
        }
        if !target.has_column(name) {
            return Err(CascadeError::Validation(format!(
                "entity '{}' has no column or association '{}'",
                target.name(),
                name
            )));
        }
        scalars.insert(name.clone(), Value::from_json(value)?);
    }
    record.fill(scalars)?;
    Ok(record)
}
