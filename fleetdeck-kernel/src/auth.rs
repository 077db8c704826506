/**
 * AUTH - Identité de l'appelant
 *
 * RÔLE :
 * Traduit le header x-api-key en identité explicite (Caller) passée à chaque
 * opération du registre. Aucun état de session global n'est consulté.
 *
 * SÉCURITÉ :
 * - /health reste accessible sans clé
 * - Aucune clé configurée => accès refusé partout ailleurs (fail-closed)
 */

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::registry::RegistryError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Identité opaque de l'appelant, fournie par la couche d'authentification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub principal: String,
}

impl Caller {
    pub fn new(principal: impl Into<String>) -> Self {
        Self { principal: principal.into() }
    }

    /// Identité des tâches internes (seed au démarrage).
    pub fn system() -> Self {
        Self::new("system")
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.principal)
    }
}

#[derive(Clone, Default)]
pub struct ApiKeys {
    keys: Arc<HashMap<String, String>>,
}

impl ApiKeys {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys: Arc::new(keys) }
    }

    pub fn resolve(&self, key: &str) -> Option<Caller> {
        self.keys.get(key).map(|p| Caller::new(p.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn unauthorized() -> RegistryError {
    RegistryError::Unauthorized(format!("missing or invalid {API_KEY_HEADER} header"))
}

pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    mut req: Request,
    next: Next,
) -> Result<Response, RegistryError> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    if keys.is_empty() {
        warn!("SECURITY: no api_keys configured - API access denied");
        return Err(unauthorized());
    }

    let caller = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| keys.resolve(v));

    let Some(caller) = caller else {
        warn!(path = %req.uri().path(), "[auth] rejected request with missing or unknown api key");
        return Err(unauthorized());
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = RegistryError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(unauthorized)
    }
}
