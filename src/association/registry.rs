use crate::core::{CascadeError, Result};
use crate::entity::EntityDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// All registered entity descriptors. Registration is only allowed before
/// the first lookup; the first lookup seals the registry and cross-checks
/// that every association points at a registered entity.
pub struct AssociationRegistry {
    entities: RwLock<HashMap<String, Arc<EntityDescriptor>>>,
    sealed: AtomicBool,
}

impl AssociationRegistry {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn register(&self, descriptor: EntityDescriptor) -> Result<Arc<EntityDescriptor>> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(CascadeError::Configuration(format!(
                "cannot register '{}' after first use",
                descriptor.name()
            )));
        }

        for association in descriptor.associations() {
            association.validate()?;
        }

        let mut entities = self.entities.write()?;
        if entities.contains_key(descriptor.name()) {
            return Err(CascadeError::Configuration(format!(
                "entity '{}' registered twice",
                descriptor.name()
            )));
        }

        let descriptor = Arc::new(descriptor);
        entities.insert(descriptor.name().to_string(), descriptor.clone());
        Ok(descriptor)
    }

    pub fn descriptor(&self, name: &str) -> Result<Arc<EntityDescriptor>> {
        self.seal()?;
        self.entities
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| CascadeError::Configuration(format!("unknown entity '{name}'")))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entities
            .read()
            .map(|e| e.contains_key(name))
            .unwrap_or(false)
    }

    pub fn entity_names(&self) -> Result<Vec<String>> {
        Ok(self.entities.read()?.keys().cloned().collect())
    }

    /// Validates every declared edge against the registered set. The flag
    /// latches only after validation passes, so a dangling target keeps
    /// failing every lookup and the missing entity can still be registered.
    fn seal(&self) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Ok(());
        }

        let entities = self.entities.read()?;
        for descriptor in entities.values() {
            for association in descriptor.associations() {
                if !entities.contains_key(&association.target) {
                    return Err(CascadeError::Configuration(format!(
                        "entity '{}' association '{}' targets unknown entity '{}'",
                        descriptor.name(),
                        association.name,
                        association.target
                    )));
                }
                if let Some(junction) = &association.junction
                    && !entities.contains_key(&junction.target)
                {
                    return Err(CascadeError::Configuration(format!(
                        "entity '{}' association '{}' uses unknown junction entity '{}'",
                        descriptor.name(),
                        association.name,
                        junction.target
                    )));
                }
            }
        }
        self.sealed.store(true, Ordering::Release);
        Ok(())
    }
}

impl Default for AssociationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::Association;

    #[test]
    fn lookup_seals_registration() {
        let registry = AssociationRegistry::new();
        registry.register(EntityDescriptor::new("users")).unwrap();
        assert!(registry.descriptor("users").is_ok());
        assert!(registry.register(EntityDescriptor::new("posts")).is_err());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = AssociationRegistry::new();
        registry.register(EntityDescriptor::new("users")).unwrap();
        assert!(registry.register(EntityDescriptor::new("users")).is_err());
    }

    #[test]
    fn sealing_rejects_dangling_targets() {
        let registry = AssociationRegistry::new();
        registry
            .register(
                EntityDescriptor::new("users")
                    .with_association(Association::owning_many("posts", "posts", "user_id")),
            )
            .unwrap();
        assert!(registry.descriptor("users").is_err());
    }

    #[test]
    fn failed_seal_does_not_latch() {
        let registry = AssociationRegistry::new();
        registry
            .register(
                EntityDescriptor::new("users")
                    .with_association(Association::owning_many("posts", "posts", "user_id")),
            )
            .unwrap();

        // Every lookup fails, not only the first.
        assert!(registry.descriptor("users").is_err());
        assert!(registry.descriptor("users").is_err());

        // Registering the missing target repairs the graph and seals it.
        registry.register(EntityDescriptor::new("posts")).unwrap();
        assert!(registry.descriptor("users").is_ok());
        assert!(registry.register(EntityDescriptor::new("tags")).is_err());
    }
}
