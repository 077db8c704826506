use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub store: StoreConf,
    /// Fichier JSON du jeu de feedback (None => mémoire seule)
    pub feedback_path: Option<String>,
    /// clé API -> identité de l'appelant
    pub api_keys: HashMap<String, String>,
    pub max_conflict_retries: u32,
    pub seed_demo_data: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConf {
    pub kind: StoreKind,
    pub path: String, // ex: "./data/services.json"
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

impl Default for StoreConf {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: "./data/services.json".into(),
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            store: StoreConf::default(),
            feedback_path: Some("./data/feedback.json".into()),
            api_keys: HashMap::new(),
            max_conflict_retries: 3,
            seed_demo_data: false,
        }
    }
}

fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[kernel] config invalide: {e}");
        KernelConfig::default()
    })
}

fn apply_env_overrides(mut cfg: KernelConfig) -> KernelConfig {
    if let Ok(listen) = std::env::var("FLEETDECK_LISTEN") {
        if !listen.trim().is_empty() {
            cfg.listen = listen;
        }
    }
    if let Ok(seed) = std::env::var("FLEETDECK_SEED") {
        cfg.seed_demo_data = matches!(seed.as_str(), "1" | "true" | "yes");
    }
    cfg
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("FLEETDECK_CONFIG").unwrap_or_else(|_| "fleetdeck.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        warn!("[kernel] pas de {path}, usage config par défaut");
        KernelConfig::default()
    };
    apply_env_overrides(cfg)
}
