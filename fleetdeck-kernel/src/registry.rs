/**
 * SERVICE REGISTRY - Registre des services IA et de leurs instances
 *
 * RÔLE : Source de vérité unique des services. Valide les commandes, applique
 * les mutations via le RegistryStore et calcule les vues dérivées.
 *
 * INVARIANT CENTRAL : pour tout service renvoyé, replicas == len(instances).
 * replicas n'est écrit que par Service::sync_replicas() après chaque mutation
 * de la collection d'instances.
 *
 * CONCURRENCE : chaque commande est un read-modify-write gardé par la révision
 * du document. En cas de conflit, la commande est rejouée depuis une lecture
 * fraîche (max_conflict_retries fois) puis ConflictError remonte à l'appelant.
 * L'unicité des noms est la seule règle inter-documents : création et
 * renommage passent par un verrou dédié.
 */

use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::metrics::{self, FeedbackMetricsSummary, MetricsSnapshot, RatingView, UsageView};
use crate::models::{
    Instance, InstanceSpec, InstanceStatus, MetricsPatch, NewService, Service, ServiceMetrics,
    ServicePatch,
};
use crate::store::{SharedStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("{0}")]
    Unauthorized(String),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::Validation(_) => "ValidationError",
            RegistryError::NotFound(_) => "NotFoundError",
            RegistryError::Conflict(_) => "ConflictError",
            RegistryError::StoreUnavailable(_) => "StoreUnavailableError",
            RegistryError::Unauthorized(_) => "UnauthorizedError",
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } => RegistryError::Conflict(e.to_string()),
            StoreError::NotFound(id) => RegistryError::NotFound(format!("service {id} not found")),
            StoreError::Invalid { .. } | StoreError::Serialization(_) | StoreError::Io(_) => {
                RegistryError::StoreUnavailable(e.to_string())
            }
        }
    }
}

fn service_not_found(id: &str) -> RegistryError {
    RegistryError::NotFound(format!("service {id} not found"))
}

fn instance_not_found(service_id: &str, instance_id: &str) -> RegistryError {
    RegistryError::NotFound(format!("instance {instance_id} not found in service {service_id}"))
}

fn validated_name(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::Validation("service name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn validate_version(version: &str) -> Result<(), RegistryError> {
    if version.trim().is_empty() {
        return Err(RegistryError::Validation("service version must not be empty".into()));
    }
    Ok(())
}

pub struct ServiceRegistry {
    store: SharedStore,
    max_conflict_retries: u32,
    names: Mutex<()>,
}

impl ServiceRegistry {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            max_conflict_retries: 3,
            names: Mutex::new(()),
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    fn load(&self, service_id: &str) -> Result<Service, RegistryError> {
        self.store.get(service_id)?.ok_or_else(|| service_not_found(service_id))
    }

    fn ensure_name_free(&self, name: &str, except_id: Option<&str>) -> Result<(), RegistryError> {
        if let Some(existing) = self.store.get_by_name(name)? {
            if Some(existing.id.as_str()) != except_id {
                return Err(RegistryError::Validation(format!(
                    "service name '{name}' is already in use"
                )));
            }
        }
        Ok(())
    }

    /// Read-modify-write d'un document, rejoué sur conflit de révision.
    fn mutate<F>(&self, service_id: &str, mut apply: F) -> Result<Service, RegistryError>
    where
        F: FnMut(&mut Service, OffsetDateTime) -> Result<(), RegistryError>,
    {
        let mut attempt = 0;
        loop {
            let mut service = self.load(service_id)?;
            let expected = service.revision;
            apply(&mut service, OffsetDateTime::now_utc())?;

            match self.store.save(service, Some(expected)) {
                Ok(saved) => return Ok(saved),
                Err(StoreError::Conflict { .. }) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    debug!(service_id, attempt, "[registry] revision conflict, retrying");
                }
                // supprimé entre la lecture et l'écriture
                Err(StoreError::Conflict { found: None, .. }) => {
                    return Err(service_not_found(service_id));
                }
                Err(e) => {
                    warn!(service_id, error = %e, "[registry] save failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Tous les services, instances et métriques incluses.
    pub fn list_services(&self, _caller: &Caller) -> Result<Vec<Service>, RegistryError> {
        Ok(self.store.list()?)
    }

    pub fn get_service(&self, _caller: &Caller, service_id: &str) -> Result<Service, RegistryError> {
        self.load(service_id)
    }

    pub fn find_service_by_name(&self, _caller: &Caller, name: &str) -> Result<Service, RegistryError> {
        self.store
            .get_by_name(name.trim())?
            .ok_or_else(|| RegistryError::NotFound(format!("service '{}' not found", name.trim())))
    }

    pub fn create_service(&self, caller: &Caller, input: NewService) -> Result<Service, RegistryError> {
        let name = validated_name(&input.name)?;
        validate_version(&input.version)?;
        for spec in &input.instances {
            spec.validate()?;
        }

        let now = OffsetDateTime::now_utc();
        let mut service = Service {
            id: Uuid::new_v4().to_string(),
            name,
            service_type: input.service_type,
            framework: input.framework,
            version: input.version,
            description: input.description,
            replicas: 0,
            instances: input.instances.iter().map(|s| Instance::launch(s, now)).collect(),
            metrics: ServiceMetrics::default(),
            status: input.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            revision: 0,
        };
        service.sync_replicas(now);

        let saved = {
            let _names = self.names.lock();
            self.ensure_name_free(&service.name, None)?;
            self.store.save(service, None)?
        };

        info!(%caller, service_id = %saved.id, name = %saved.name, replicas = saved.replicas, "[registry] service created");
        Ok(saved)
    }

    pub fn update_service(
        &self,
        caller: &Caller,
        service_id: &str,
        patch: ServicePatch,
    ) -> Result<Service, RegistryError> {
        // service inconnu => NotFound avant toute validation du patch
        self.load(service_id)?;
        let new_name = patch.name.as_deref().map(validated_name).transpose()?;
        if let Some(v) = &patch.version {
            validate_version(v)?;
        }

        // renommage : l'unicité doit tenir jusqu'à l'écriture
        let _names = new_name.as_ref().map(|_| self.names.lock());
        if let Some(name) = &new_name {
            self.ensure_name_free(name, Some(service_id))?;
        }

        let saved = self.mutate(service_id, |svc, now| {
            if let Some(name) = &new_name {
                svc.name = name.clone();
            }
            if let Some(t) = &patch.service_type {
                svc.service_type = t.clone();
            }
            if let Some(f) = &patch.framework {
                svc.framework = f.clone();
            }
            if let Some(v) = &patch.version {
                svc.version = v.clone();
            }
            if let Some(d) = &patch.description {
                svc.description = d.clone();
            }
            if let Some(s) = patch.status {
                svc.status = s;
            }
            svc.touch(now);
            Ok(())
        })?;

        info!(%caller, service_id, "[registry] service updated");
        Ok(saved)
    }

    /// Suppression définitive ; les instances embarquées disparaissent avec le document.
    pub fn delete_service(&self, caller: &Caller, service_id: &str) -> Result<(), RegistryError> {
        let service = self.load(service_id)?;
        self.store.delete(service_id)?;
        info!(%caller, service_id, name = %service.name, instances = service.instances.len(), "[registry] service deleted");
        Ok(())
    }

    pub fn add_instance(
        &self,
        caller: &Caller,
        service_id: &str,
        spec: InstanceSpec,
    ) -> Result<Service, RegistryError> {
        // service inconnu => NotFound avant toute validation du descripteur
        self.load(service_id)?;
        spec.validate()?;

        let saved = self.mutate(service_id, |svc, now| {
            svc.instances.push(Instance::launch(&spec, now));
            svc.sync_replicas(now);
            Ok(())
        })?;

        info!(%caller, service_id, host = %spec.host, port = spec.port, replicas = saved.replicas, "[registry] instance added");
        Ok(saved)
    }

    pub fn remove_instance(
        &self,
        caller: &Caller,
        service_id: &str,
        instance_id: &str,
    ) -> Result<Service, RegistryError> {
        let saved = self.mutate(service_id, |svc, now| {
            let before = svc.instances.len();
            svc.instances.retain(|i| i.id != instance_id);
            if svc.instances.len() == before {
                return Err(instance_not_found(service_id, instance_id));
            }
            svc.sync_replicas(now);
            Ok(())
        })?;

        info!(%caller, service_id, instance_id, replicas = saved.replicas, "[registry] instance removed");
        Ok(saved)
    }

    /// Transitions libres entre Running, Stopped et Error.
    pub fn update_instance_status(
        &self,
        caller: &Caller,
        service_id: &str,
        instance_id: &str,
        new_status: &str,
    ) -> Result<Service, RegistryError> {
        let status: InstanceStatus = new_status.parse()?;

        let saved = self.mutate(service_id, |svc, now| {
            let instance = svc
                .instance_mut(instance_id)
                .ok_or_else(|| instance_not_found(service_id, instance_id))?;
            instance.status = status;
            svc.touch(now);
            Ok(())
        })?;

        info!(%caller, service_id, instance_id, %status, "[registry] instance status updated");
        Ok(saved)
    }

    pub fn record_metrics(
        &self,
        caller: &Caller,
        service_id: &str,
        patch: MetricsPatch,
    ) -> Result<Service, RegistryError> {
        let saved = self.mutate(service_id, |svc, now| {
            let mut next = svc.metrics.clone();
            next.apply(&patch);
            next.validate()?;
            svc.metrics = next;
            svc.touch(now);
            Ok(())
        })?;

        debug!(%caller, service_id, "[registry] metrics recorded");
        Ok(saved)
    }

    pub fn get_service_ratings(&self, _caller: &Caller, service_id: &str) -> Result<RatingView, RegistryError> {
        Ok(metrics::ratings_of(&self.load(service_id)?.metrics))
    }

    pub fn get_service_usage(&self, _caller: &Caller, service_id: &str) -> Result<UsageView, RegistryError> {
        Ok(metrics::usage_of(&self.load(service_id)?.metrics))
    }

    pub fn get_metrics_snapshot(&self, caller: &Caller, name: &str) -> Result<MetricsSnapshot, RegistryError> {
        let service = self.find_service_by_name(caller, name)?;
        Ok(MetricsSnapshot::from(&service.metrics))
    }

    pub fn get_feedback_metrics_summary(&self, _caller: &Caller) -> Result<FeedbackMetricsSummary, RegistryError> {
        Ok(metrics::summarize(&self.store.list()?))
    }
}
