/**
 * JSON FILE STORE - Persistance des services dans un fichier JSON
 *
 * FONCTIONNEMENT :
 * - Cache mémoire chargé au démarrage (fichier absent => registre vide)
 * - Chaque mutation réécrit le tableau complet : fichier temporaire puis rename,
 *   un lecteur ne voit jamais un tableau d'instances partiel
 * - Échec d'écriture disque => le cache est restauré, la mutation n'a pas eu lieu
 * - Au chargement : replicas recalculé, jauges hors bornes => document refusé
 */

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{next_revision, sort_for_listing, RegistryStore, StoreError};
use crate::models::Service;

pub struct JsonFileStore {
    storage_path: PathBuf,
    cache: Mutex<HashMap<String, Service>>,
}

impl JsonFileStore {
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let store = Self {
            storage_path: storage_path.into(),
            cache: Mutex::new(HashMap::new()),
        };
        store.load_from_disk()?;
        info!(path = ?store.storage_path, services = store.cache.lock().len(), "[store] json file store opened");
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        if !self.storage_path.exists() {
            if let Some(parent) = self.storage_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            return Ok(());
        }

        let content = fs::read_to_string(&self.storage_path)?;
        if content.trim().is_empty() {
            return Ok(());
        }
        let services: Vec<Service> = serde_json::from_str(&content)?;
        let mut cache = HashMap::with_capacity(services.len());
        for mut service in services {
            service.metrics.validate().map_err(|e| StoreError::Invalid {
                id: service.id.clone(),
                reason: e.to_string(),
            })?;
            if service.recount_replicas() {
                warn!(service_id = %service.id, replicas = service.replicas, "[store] stored replicas did not match instances, recounted");
            }
            cache.insert(service.id.clone(), service);
        }
        *self.cache.lock() = cache;
        Ok(())
    }

    fn persist(&self, cache: &HashMap<String, Service>) -> Result<(), StoreError> {
        let mut all: Vec<Service> = cache.values().cloned().collect();
        sort_for_listing(&mut all);
        let json = serde_json::to_string_pretty(&all)?;

        write_atomically(&self.storage_path, json.as_bytes())?;
        debug!(path = ?self.storage_path, services = all.len(), "[store] flushed to disk");
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Écrit dans `<fichier>.tmp` puis rename : jamais de fichier tronqué.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

impl RegistryStore for JsonFileStore {
    fn get(&self, id: &str) -> Result<Option<Service>, StoreError> {
        Ok(self.cache.lock().get(id).cloned())
    }

    fn get_by_name(&self, name: &str) -> Result<Option<Service>, StoreError> {
        Ok(self.cache.lock().values().find(|s| s.name == name).cloned())
    }

    fn list(&self) -> Result<Vec<Service>, StoreError> {
        let mut all: Vec<Service> = self.cache.lock().values().cloned().collect();
        sort_for_listing(&mut all);
        Ok(all)
    }

    fn save(&self, mut service: Service, expected_revision: Option<u64>) -> Result<Service, StoreError> {
        let mut cache = self.cache.lock();
        service.revision = next_revision(&service.id, cache.get(&service.id), expected_revision)?;

        let previous = cache.insert(service.id.clone(), service.clone());
        if let Err(e) = self.persist(&cache) {
            match previous {
                Some(p) => cache.insert(service.id.clone(), p),
                None => cache.remove(&service.id),
            };
            return Err(e);
        }
        Ok(service)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        let Some(removed) = cache.remove(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if let Err(e) = self.persist(&cache) {
            cache.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{exercise_store_contract, sample};
    use serde_json::json;

    fn write_documents(path: &Path, docs: serde_json::Value) {
        fs::write(path, docs.to_string()).unwrap();
    }

    #[test]
    fn file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("services.json")).unwrap();
        exercise_store_contract(&store);
    }

    #[test]
    fn reopening_restores_documents_and_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("services.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            let saved = store.save(sample("a", "alpha"), None).unwrap();
            store.save(saved, Some(1)).unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        let a = reopened.get("a").unwrap().unwrap();
        assert_eq!(a.name, "alpha");
        assert_eq!(a.revision, 2);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn loading_recounts_replicas_from_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        let mut doc = serde_json::to_value(sample("a", "alpha")).unwrap();
        doc["replicas"] = json!(5);
        write_documents(&path, json!([doc]));

        let store = JsonFileStore::open(&path).unwrap();
        let a = store.get("a").unwrap().unwrap();
        assert_eq!(a.replicas, 0);
        assert!(a.instances.is_empty());
        assert_eq!(store.list().unwrap()[0].replicas, 0);
    }

    #[test]
    fn loading_rejects_out_of_range_gauges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        let mut doc = serde_json::to_value(sample("a", "alpha")).unwrap();
        doc["metrics"]["cpu_percent"] = json!(500.0);
        write_documents(&path, json!([doc]));

        match JsonFileStore::open(&path) {
            Err(StoreError::Invalid { id, .. }) => assert_eq!(id, "a"),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("document with cpu_percent=500 was accepted"),
        }
    }

    #[test]
    fn failed_flush_rolls_back_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        let store = JsonFileStore::open(&path).unwrap();
        let a = store.save(sample("a", "alpha"), None).unwrap();

        // un répertoire à la place du fichier temporaire fait échouer l'écriture
        fs::create_dir(temp_path(&path)).unwrap();

        assert!(matches!(store.save(sample("b", "beta"), None), Err(StoreError::Io(_))));
        assert!(store.get("b").unwrap().is_none());

        let mut edit = a.clone();
        edit.description = "lost".into();
        assert!(matches!(store.save(edit, Some(1)), Err(StoreError::Io(_))));
        assert_eq!(store.get("a").unwrap().unwrap(), a);

        assert!(matches!(store.delete("a"), Err(StoreError::Io(_))));
        assert_eq!(store.get("a").unwrap().unwrap(), a);
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
