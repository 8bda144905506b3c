//! Lazy project identity and credential resolution.
//!
//! Identity is not needed to construct the pipeline, only to deliver.
//! The [`IdentityClient`] resolves it at most once, on first need, and
//! caches the outcome either way: a failed resolution is permanent and
//! disables delivery rather than being retried per batch.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

/// Resolved project identity used to authorize deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Project the events are reported under.
    pub project_id: String,
    /// Credential attached to every report request.
    pub credential: Credential,
}

/// Credential material for the report endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer token sent in the Authorization header.
    Bearer(String),
    /// API key sent as a `key` query parameter.
    ApiKey(String),
}

impl std::fmt::Debug for Credential {
    // Never print credential material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => write!(f, "Credential::Bearer(***)"),
            Self::ApiKey(_) => write!(f, "Credential::ApiKey(***)"),
        }
    }
}

/// Source of project identity.
///
/// The dispatcher only ever sees this trait; tests substitute stub
/// providers to exercise success, failure, and concurrency behavior.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves the identity this process reports as.
    async fn resolve(&self) -> Result<Identity>;
}

/// Identity provider backed by resolved configuration plus the ambient
/// environment.
///
/// Explicit configuration wins; fields left unset are looked up in the
/// environment at resolution time, so credentials injected after startup
/// but before the first capture are still honored.
pub struct EnvIdentityProvider {
    project_id: Option<String>,
    credential: Option<String>,
    key: Option<String>,
}

impl EnvIdentityProvider {
    /// Creates a provider from resolved configuration.
    pub fn new(config: &faultline_core::Config) -> Self {
        Self {
            project_id: config.project_id.clone(),
            credential: config.credential.clone(),
            key: config.key.clone(),
        }
    }

    fn lookup(configured: &Option<String>, env_var: &str) -> Option<String> {
        configured
            .clone()
            .or_else(|| std::env::var(env_var).ok().filter(|v| !v.is_empty()))
    }
}

#[async_trait]
impl IdentityProvider for EnvIdentityProvider {
    async fn resolve(&self) -> Result<Identity> {
        let project_id = Self::lookup(&self.project_id, "FAULTLINE_PROJECT_ID")
            .ok_or_else(|| {
                DispatchError::identity(
                    "no project id: set project_id or FAULTLINE_PROJECT_ID",
                )
            })?;

        let credential = if let Some(token) =
            Self::lookup(&self.credential, "FAULTLINE_CREDENTIAL")
        {
            Credential::Bearer(token)
        } else if let Some(key) = Self::lookup(&self.key, "FAULTLINE_KEY") {
            Credential::ApiKey(key)
        } else {
            return Err(DispatchError::identity(
                "no credential: set credential, key, or the matching FAULTLINE_ variables",
            ));
        };

        Ok(Identity { project_id, credential })
    }
}

/// Caches the outcome of identity resolution.
///
/// Resolution runs at most once across all callers; concurrent first
/// requests coalesce onto a single provider call. Both success and
/// failure are cached.
pub struct IdentityClient {
    provider: Box<dyn IdentityProvider>,
    resolved: OnceCell<std::result::Result<Identity, DispatchError>>,
}

impl IdentityClient {
    /// Creates a client around the given provider.
    pub fn new(provider: Box<dyn IdentityProvider>) -> Self {
        Self { provider, resolved: OnceCell::new() }
    }

    /// Returns the resolved identity, running the provider on first call.
    ///
    /// # Errors
    ///
    /// Returns the cached resolution failure on this and every later
    /// call; the provider is never re-invoked after it fails.
    pub async fn get(&self) -> Result<&Identity> {
        let outcome = self
            .resolved
            .get_or_init(|| async {
                let outcome = self.provider.resolve().await;
                match &outcome {
                    Ok(identity) => {
                        debug!(project_id = %identity.project_id, "identity resolved");
                    },
                    Err(error) => {
                        warn!(%error, "identity resolution failed, reporting disabled");
                    },
                }
                outcome
            })
            .await;

        outcome.as_ref().map_err(Clone::clone)
    }

    /// Whether an identity has been resolved successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.resolved.get(), Some(Ok(_)))
    }

    /// Whether resolution has already run and failed.
    pub fn is_poisoned(&self) -> bool {
        matches!(self.resolved.get(), Some(Err(_)))
    }
}
