/**
 * REGISTRY STORE - Interface de persistance des documents Service
 *
 * RÔLE :
 * Abstrait le stockage durable des services. Le registre ne connaît que ce
 * trait ; n'importe quel store clé → document le satisfait.
 *
 * FONCTIONNEMENT :
 * - Un document par service, instances embarquées (aucune jointure)
 * - save() = upsert complet, gardé par la révision attendue (concurrence optimiste)
 * - MemoryStore : HashMap sous RwLock
 * - JsonFileStore : cache mémoire + fichier JSON réécrit atomiquement
 *
 * CONTRAT DE RÉVISION :
 * - expected = None    => le document ne doit pas exister (création), révision 1
 * - expected = Some(r) => la révision stockée doit valoir r, elle devient r + 1
 * - sinon StoreError::Conflict
 */

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::config::{StoreConf, StoreKind};
use crate::models::Service;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("revision conflict on service {id}: expected {expected:?}, found {found:?}")]
    Conflict {
        id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },
    #[error("service not found: {0}")]
    NotFound(String),
    #[error("invalid stored document {id}: {reason}")]
    Invalid { id: String, reason: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait RegistryStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Service>, StoreError>;

    fn get_by_name(&self, name: &str) -> Result<Option<Service>, StoreError>;

    /// Tous les services, triés par date de création puis id.
    fn list(&self) -> Result<Vec<Service>, StoreError>;

    /// Upsert atomique d'un document ; renvoie le document tel que stocké.
    fn save(&self, service: Service, expected_revision: Option<u64>) -> Result<Service, StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Nom court du backend, pour /system/health.
    fn kind(&self) -> &'static str;
}

pub type SharedStore = Arc<dyn RegistryStore>;

/// Vérifie la révision et renvoie la suivante. Partagé par les backends.
pub(crate) fn next_revision(
    id: &str,
    stored: Option<&Service>,
    expected: Option<u64>,
) -> Result<u64, StoreError> {
    let found = stored.map(|s| s.revision);
    match (found, expected) {
        (None, None) => Ok(1),
        (Some(f), Some(e)) if f == e => Ok(f + 1),
        _ => Err(StoreError::Conflict {
            id: id.to_string(),
            expected,
            found,
        }),
    }
}

pub(crate) fn sort_for_listing(services: &mut [Service]) {
    services.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

pub fn create_store(conf: &StoreConf) -> Result<SharedStore, StoreError> {
    match conf.kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::File => Ok(Arc::new(JsonFileStore::open(&conf.path)?)),
    }
}
