/**
 * MODÈLES FLEETDECK - Documents Service / Instance et métriques typées
 *
 * RÔLE :
 * Définit la forme unique des données consommées par toutes les vues
 * (dashboard, gestionnaire de services, notations, usage, feedback).
 *
 * FONCTIONNEMENT :
 * - Service = document racine, possède ses instances (sous-documents embarqués)
 * - replicas n'est jamais écrit directement : recalculé par sync_replicas()
 * - ServiceMetrics = compteurs entiers + jauges flottantes (unité dans le nom)
 * - revision = jeton de concurrence optimiste, incrémenté par le store
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::registry::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    #[default]
    Inactive,
    Error,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InstanceStatus {
    #[default]
    Running,
    Stopped,
    Error,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Running => "Running",
            InstanceStatus::Stopped => "Stopped",
            InstanceStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

impl FromStr for InstanceStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(InstanceStatus::Running),
            "Stopped" => Ok(InstanceStatus::Stopped),
            "Error" => Ok(InstanceStatus::Error),
            other => Err(RegistryError::Validation(format!(
                "invalid instance status '{other}' (expected Running, Stopped or Error)"
            ))),
        }
    }
}

/// Une réplique déployée d'un service. N'existe qu'à l'intérieur de son parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub end_point: String,
    pub status: InstanceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Instance {
    /// Nouvelle instance `Running` avec id et horodatage frais.
    pub fn launch(spec: &InstanceSpec, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            host: spec.host.trim().to_string(),
            port: spec.port as u16,
            end_point: spec.end_point.clone(),
            status: InstanceStatus::Running,
            created_at: now,
        }
    }
}

/// Descripteur de connexion fourni par l'appelant (port encore non borné).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub host: String,
    pub port: i64,
    #[serde(default)]
    pub end_point: String,
}

impl InstanceSpec {
    pub fn new(host: &str, port: i64, end_point: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            end_point: end_point.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.host.trim().is_empty() {
            return Err(RegistryError::Validation("instance host must not be empty".into()));
        }
        if !(1..=65535).contains(&self.port) {
            return Err(RegistryError::Validation(format!(
                "instance port {} out of range [1, 65535]",
                self.port
            )));
        }
        Ok(())
    }
}

/// Mesures d'un service : compteurs monotones + jauges libres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMetrics {
    pub usage_total: u64,
    pub rejection_total: u64,
    pub thumbs_up_total: u64,
    pub neutral_total: u64,
    pub thumbs_down_total: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throughput_rps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_rate_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_score: Option<f64>,
}

impl ServiceMetrics {
    fn gauges(&self) -> [(&'static str, Option<f64>, bool); 8] {
        // (nom, valeur, est un pourcentage)
        [
            ("cpu_percent", self.cpu_percent, true),
            ("mem_mb", self.mem_mb, false),
            ("latency_ms", self.latency_ms, false),
            ("accuracy_percent", self.accuracy_percent, true),
            ("availability_percent", self.availability_percent, true),
            ("throughput_rps", self.throughput_rps, false),
            ("error_rate_percent", self.error_rate_percent, true),
            ("drift_score", self.drift_score, false),
        ]
    }

    /// Jauges finies, positives, pourcentages dans [0, 100].
    pub fn validate(&self) -> Result<(), RegistryError> {
        for (name, value, percent) in self.gauges() {
            let Some(v) = value else { continue };
            if !v.is_finite() || v < 0.0 {
                return Err(RegistryError::Validation(format!(
                    "gauge {name} must be a finite non-negative number, got {v}"
                )));
            }
            if percent && v > 100.0 {
                return Err(RegistryError::Validation(format!(
                    "gauge {name} is a percentage, got {v}"
                )));
            }
        }
        Ok(())
    }

    /// Ajoute les compteurs (saturant) et remplace les jauges présentes.
    pub fn apply(&mut self, patch: &MetricsPatch) {
        self.usage_total = self.usage_total.saturating_add(patch.usage_total);
        self.rejection_total = self.rejection_total.saturating_add(patch.rejection_total);
        self.thumbs_up_total = self.thumbs_up_total.saturating_add(patch.thumbs_up_total);
        self.neutral_total = self.neutral_total.saturating_add(patch.neutral_total);
        self.thumbs_down_total = self.thumbs_down_total.saturating_add(patch.thumbs_down_total);

        let g = &patch.gauges;
        if g.cpu_percent.is_some() { self.cpu_percent = g.cpu_percent; }
        if g.mem_mb.is_some() { self.mem_mb = g.mem_mb; }
        if g.latency_ms.is_some() { self.latency_ms = g.latency_ms; }
        if g.accuracy_percent.is_some() { self.accuracy_percent = g.accuracy_percent; }
        if g.availability_percent.is_some() { self.availability_percent = g.availability_percent; }
        if g.throughput_rps.is_some() { self.throughput_rps = g.throughput_rps; }
        if g.error_rate_percent.is_some() { self.error_rate_percent = g.error_rate_percent; }
        if g.drift_score.is_some() { self.drift_score = g.drift_score; }
    }
}

/// Incréments de compteurs + nouvelles valeurs de jauges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsPatch {
    pub usage_total: u64,
    pub rejection_total: u64,
    pub thumbs_up_total: u64,
    pub neutral_total: u64,
    pub thumbs_down_total: u64,
    #[serde(flatten)]
    pub gauges: GaugePatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugePatch {
    pub cpu_percent: Option<f64>,
    pub mem_mb: Option<f64>,
    pub latency_ms: Option<f64>,
    pub accuracy_percent: Option<f64>,
    pub availability_percent: Option<f64>,
    pub throughput_rps: Option<f64>,
    pub error_rate_percent: Option<f64>,
    pub drift_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub framework: String,
    pub version: String,
    pub description: String,
    pub replicas: usize,
    pub instances: Vec<Instance>,
    pub metrics: ServiceMetrics,
    pub status: ServiceStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub revision: u64,
}

impl Service {
    /// Recalcule replicas depuis la collection d'instances et rafraîchit updatedAt.
    pub fn sync_replicas(&mut self, now: OffsetDateTime) {
        self.recount_replicas();
        self.updated_at = now;
    }

    /// Seul point d'écriture de replicas. Renvoie true si la valeur a changé.
    pub fn recount_replicas(&mut self) -> bool {
        let count = self.instances.len();
        let changed = self.replicas != count;
        self.replicas = count;
        changed
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
    }

    pub fn instance_mut(&mut self, instance_id: &str) -> Option<&mut Instance> {
        self.instances.iter_mut().find(|i| i.id == instance_id)
    }
}

/// Entrée de CreateService.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub framework: String,
    pub version: String,
    pub description: String,
    pub status: Option<ServiceStatus>,
    pub instances: Vec<InstanceSpec>,
}

/// Édition directe des champs descriptifs (jamais replicas/instances).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub framework: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub status: Option<ServiceStatus>,
}

/// Enregistrement de feedback utilisateur (lecture seule pour le registre).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: String,
    pub initial: String,
    pub tokenized: String,
    pub userfeedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
