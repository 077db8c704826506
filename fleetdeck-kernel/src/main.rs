/**
 * FLEETDECK KERNEL - Point d'entrée du serveur de registre
 *
 * RÔLE : Orchestration des modules : config, store, registre, feedback, HTTP.
 * Bootstrap complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : client -> API REST -> ServiceRegistry -> RegistryStore.
 * UTILITÉ : source de vérité unique des services IA et de leurs instances.
 */

mod auth;
mod config;
mod feedback;
mod health;
mod http;
mod metrics;
mod models;
mod registry;
mod seed;
mod store;

use crate::auth::ApiKeys;
use crate::config::load_config;
use crate::feedback::FeedbackLog;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::registry::ServiceRegistry;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleetdeck_kernel=info,tower_http=info")),
        )
        .init();

    let cfg = load_config().await;

    // store + registre
    let store = store::create_store(&cfg.store)
        .with_context(|| format!("failed to open {:?} store at {}", cfg.store.kind, cfg.store.path))?;
    let registry = Arc::new(
        ServiceRegistry::new(store).with_max_conflict_retries(cfg.max_conflict_retries),
    );

    // jeu de feedback
    let feedback = Arc::new(match &cfg.feedback_path {
        Some(path) => FeedbackLog::open(path)
            .with_context(|| format!("failed to open feedback log at {path}"))?,
        None => FeedbackLog::in_memory(),
    });

    if cfg.seed_demo_data {
        match seed::seed_demo_data(&registry, &feedback) {
            Ok(n) => info!("[kernel] seeded {n} demo services"),
            Err(e) => warn!("[kernel] demo seed failed: {e}"),
        }
    }

    if cfg.api_keys.is_empty() {
        warn!("[kernel] no api_keys configured: every route except /health will answer 401");
    }

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        registry,
        feedback,
        health_tracker: HealthTracker::new(),
        api_keys: ApiKeys::new(cfg.api_keys.clone()),
    };

    let app = http::build_router(app_state);

    let addr: SocketAddr = cfg
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", cfg.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[kernel] listening on http://{addr}");
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
