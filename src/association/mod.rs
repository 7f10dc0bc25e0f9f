mod payload;
mod registry;
mod resolver;

pub use payload::{ResolvedAssociation, resolve_all};
pub use registry::AssociationRegistry;
pub use resolver::related;

use crate::core::{CascadeError, Result};

/// Where the foreign key lives and how many related records to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Target table holds the foreign key, at most one related record.
    OwningOne,
    /// Target table holds the foreign key, any number of related records.
    OwningMany,
    /// The owner itself holds the foreign key.
    OwnedOne,
    /// Related records reached through a junction entity.
    ManyToMany,
    /// One record reached through an intermediate entity, read only.
    OneThrough,
    /// Many records reached through an intermediate entity, read only.
    ManyThrough,
}

impl RelationKind {
    pub fn is_singular(self) -> bool {
        matches!(self, Self::OwningOne | Self::OwnedOne | Self::OneThrough)
    }

    pub fn uses_junction(self) -> bool {
        matches!(self, Self::ManyToMany | Self::OneThrough | Self::ManyThrough)
    }

    /// Through relations never accept payloads or participate in cascades.
    pub fn is_through(self) -> bool {
        matches!(self, Self::OneThrough | Self::ManyThrough)
    }
}

/// What a delete or unlink does to the records an association points at.
/// Save propagation is always implicit; only the delete side is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CascadeAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
}

/// One declared edge in the association graph.
///
/// For junction-mediated kinds the `junction` field holds a nested
/// association describing the junction entity. On the outer association
/// `foreign_key` names the junction column pointing back at the owner; on
/// the junction itself `foreign_key` names the column pointing at the
/// target and `related_primary_key` the target's matched column.
#[derive(Debug, Clone)]
pub struct Association {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    pub foreign_key: String,
    pub primary_key: Option<String>,
    pub related_primary_key: Option<String>,
    pub on_delete: CascadeAction,
    pub junction: Option<Box<Association>>,
}

impl Association {
    fn base(
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: foreign_key.into(),
            primary_key: None,
            related_primary_key: None,
            on_delete: CascadeAction::NoAction,
            junction: None,
        }
    }

    pub fn owning_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::base(name, RelationKind::OwningOne, target, foreign_key)
    }

    pub fn owning_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::base(name, RelationKind::OwningMany, target, foreign_key)
    }

    pub fn owned_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::base(name, RelationKind::OwnedOne, target, foreign_key)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        owner_key_in_junction: impl Into<String>,
        junction: Association,
    ) -> Self {
        let mut assoc = Self::base(name, RelationKind::ManyToMany, target, owner_key_in_junction);
        assoc.junction = Some(Box::new(junction));
        assoc
    }

    pub fn one_through(
        name: impl Into<String>,
        target: impl Into<String>,
        owner_key_in_junction: impl Into<String>,
        junction: Association,
    ) -> Self {
        let mut assoc = Self::base(name, RelationKind::OneThrough, target, owner_key_in_junction);
        assoc.junction = Some(Box::new(junction));
        assoc
    }

    pub fn many_through(
        name: impl Into<String>,
        target: impl Into<String>,
        owner_key_in_junction: impl Into<String>,
        junction: Association,
    ) -> Self {
        let mut assoc = Self::base(name, RelationKind::ManyThrough, target, owner_key_in_junction);
        assoc.junction = Some(Box::new(junction));
        assoc
    }

    /// Describes the junction entity inside a junction-mediated association:
    /// `target` is the junction entity, `foreign_key` its column pointing at
    /// the related record.
    pub fn junction(
        target: impl Into<String>,
        target_key_in_junction: impl Into<String>,
    ) -> Self {
        let target = target.into();
        Self::base(
            target.clone(),
            RelationKind::OwningMany,
            target,
            target_key_in_junction,
        )
    }

    pub fn cascade_on_delete(mut self, action: CascadeAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Match against a column other than the owner's key.
    pub fn keyed_by(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Match against a column other than the target's key.
    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_primary_key = Some(column.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.junction, self.kind.uses_junction()) {
            (None, true) => Err(CascadeError::Configuration(format!(
                "association '{}' requires a junction",
                self.name
            ))),
            (Some(_), false) => Err(CascadeError::Configuration(format!(
                "association '{}' does not take a junction",
                self.name
            ))),
            (Some(junction), true) if junction.junction.is_some() => {
                Err(CascadeError::Configuration(format!(
                    "association '{}': junctions cannot nest",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}
