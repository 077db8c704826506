use parking_lot::RwLock;
use std::collections::HashMap;

use super::{next_revision, sort_for_listing, RegistryStore, StoreError};
use crate::models::Service;

/// Store volatile : tout est perdu au redémarrage.
#[derive(Default)]
pub struct MemoryStore {
    services: RwLock<HashMap<String, Service>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Service>, StoreError> {
        Ok(self.services.read().get(id).cloned())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Service>, StoreError> {
        Ok(self.services.read().values().find(|s| s.name == name).cloned())
    }

    fn list(&self) -> Result<Vec<Service>, StoreError> {
        let mut all: Vec<Service> = self.services.read().values().cloned().collect();
        sort_for_listing(&mut all);
        Ok(all)
    }

    fn save(&self, mut service: Service, expected_revision: Option<u64>) -> Result<Service, StoreError> {
        // vérification + écriture sous le même verrou
        let mut map = self.services.write();
        service.revision = next_revision(&service.id, map.get(&service.id), expected_revision)?;
        map.insert(service.id.clone(), service.clone());
        Ok(service)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.services.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
