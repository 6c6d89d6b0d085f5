//! Two-tier checkpoint manager.
//!
//! The manager fronts a fast primary store (provisioned on first use, with a
//! hard timeout) and a durable fallback store. Once a backend decision is
//! made it is cached for the life of the manager; a primary failure demotes
//! to the fallback permanently. Callers never see which tier served them
//! except through the backend name.

use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::store::{Checkpoint, CheckpointMetadata, CheckpointStore, StoreProvisioner};
use crate::domain::LoopState;
use crate::error::{Result, RunloopError};

/// How long to wait for primary store provisioning before giving up.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(5);

/// Which backend the manager should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// Probe the primary once; fall back when provisioning fails or times out
    Auto,
    /// Always use the primary; provisioning failure is an error
    ForcePrimary,
    /// Skip the primary entirely
    ForceFallback,
}

/// The cached backend decision.
enum ActiveBackend {
    Primary(Arc<dyn CheckpointStore>),
    Fallback,
}

/// Checkpoint persistence for one session.
pub struct CheckpointManager {
    session_id: String,
    region: Option<String>,
    provisioner: Arc<dyn StoreProvisioner>,
    fallback: Arc<dyn CheckpointStore>,
    selection: BackendSelection,
    provision_timeout: Duration,
    active: Option<ActiveBackend>,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("session_id", &self.session_id)
            .field("selection", &self.selection)
            .field("backend", &self.backend_name())
            .finish_non_exhaustive()
    }
}

impl CheckpointManager {
    /// Create a manager for a session
    pub fn new(
        session_id: &str,
        provisioner: Arc<dyn StoreProvisioner>,
        fallback: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            region: None,
            provisioner,
            fallback,
            selection: BackendSelection::Auto,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            active: None,
        }
    }

    /// Force or free the backend choice
    pub fn with_selection(mut self, selection: BackendSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Override the provisioning timeout
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Set the locality hint passed to the provisioner
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Rebind to a session (used when the id is generated at initialize)
    pub fn bind_session(&mut self, session_id: &str) {
        self.session_id = session_id.to_string();
    }

    /// Session this manager persists
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Name of the backend currently in use
    pub fn backend_name(&self) -> &'static str {
        match &self.active {
            Some(ActiveBackend::Primary(_)) => "primary",
            Some(ActiveBackend::Fallback) => "fallback",
            None => "unresolved",
        }
    }

    /// Save a snapshot of the given state; returns the checkpoint id.
    ///
    /// A primary put failure demotes to the fallback and retries there once;
    /// a fallback failure is terminal.
    pub async fn save(&mut self, state: &LoopState) -> Result<String> {
        self.ensure_backend().await?;
        let checkpoint = Checkpoint::from_state(state);

        if let Some(store) = self.primary_store() {
            match store.put(&checkpoint).await {
                Ok(()) => {
                    tracing::debug!(
                        session = %self.session_id,
                        iteration = checkpoint.iteration,
                        checkpoint_id = %checkpoint.checkpoint_id,
                        "checkpoint saved to primary"
                    );
                    return Ok(checkpoint.checkpoint_id);
                }
                Err(e) => self.demote(&format!("primary put failed: {e}")),
            }
        }

        self.fallback
            .put(&checkpoint)
            .await
            .map_err(|e| RunloopError::CheckpointRecovery {
                session_id: self.session_id.clone(),
                reason: format!("fallback put failed: {e}"),
            })?;
        tracing::debug!(
            session = %self.session_id,
            iteration = checkpoint.iteration,
            checkpoint_id = %checkpoint.checkpoint_id,
            "checkpoint saved to fallback"
        );
        Ok(checkpoint.checkpoint_id)
    }

    /// Load the state snapshotted at a specific iteration.
    ///
    /// A primary read failure demotes, same as save. A plain miss on a
    /// healthy primary reads through to the fallback without demoting; the
    /// recovery error means neither tier holds the iteration.
    pub async fn load(&mut self, iteration: u32) -> Result<LoopState> {
        self.ensure_backend().await?;

        if let Some(store) = self.primary_store() {
            match store.get(&self.session_id, iteration).await {
                Ok(Some(checkpoint)) => return Ok(checkpoint.state),
                Ok(None) => {
                    tracing::debug!(
                        session = %self.session_id,
                        iteration,
                        "checkpoint not on primary, reading through to fallback"
                    );
                }
                Err(e) => self.demote(&format!("primary get failed: {e}")),
            }
        }

        match self.fallback.get(&self.session_id, iteration).await {
            Ok(Some(checkpoint)) => Ok(checkpoint.state),
            Ok(None) => Err(self.missing(iteration)),
            Err(e) => Err(RunloopError::CheckpointRecovery {
                session_id: self.session_id.clone(),
                reason: format!("fallback get failed: {e}"),
            }),
        }
    }

    /// Load the state from the newest checkpoint, if any exist.
    ///
    /// `Ok(None)` is the normal fresh-session case.
    pub async fn load_latest(&mut self) -> Result<Option<LoopState>> {
        let metadata = self.list().await?;
        let latest = metadata.iter().max_by(|a, b| {
            a.iteration
                .cmp(&b.iteration)
                .then_with(|| a.checkpoint_id.cmp(&b.checkpoint_id))
        });
        match latest {
            Some(meta) => Ok(Some(self.load(meta.iteration).await?)),
            None => Ok(None),
        }
    }

    /// List checkpoint metadata for this session, ascending by iteration
    pub async fn list(&mut self) -> Result<Vec<CheckpointMetadata>> {
        self.ensure_backend().await?;

        if let Some(store) = self.primary_store() {
            match store.list(&self.session_id).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => self.demote(&format!("primary list failed: {e}")),
            }
        }

        self.fallback.list(&self.session_id).await
    }

    /// Resolve which backend to use, once per manager instance.
    async fn ensure_backend(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        let active = match self.selection {
            BackendSelection::ForceFallback => {
                tracing::debug!(session = %self.session_id, "checkpoint backend forced to fallback");
                ActiveBackend::Fallback
            }
            BackendSelection::ForcePrimary => ActiveBackend::Primary(self.provision_primary().await?),
            BackendSelection::Auto => match self.provision_primary().await {
                Ok(store) => ActiveBackend::Primary(store),
                Err(e) => {
                    tracing::warn!(
                        session = %self.session_id,
                        error = %e,
                        "primary checkpoint store unavailable, using fallback"
                    );
                    ActiveBackend::Fallback
                }
            },
        };
        self.active = Some(active);
        Ok(())
    }

    /// Provision the primary store on a spawned task so an unresponsive
    /// provisioner can be abandoned at the timeout.
    async fn provision_primary(&self) -> Result<Arc<dyn CheckpointStore>> {
        let provisioner = Arc::clone(&self.provisioner);
        let region = self.region.clone();
        let handle = tokio::spawn(async move { provisioner.provision(region.as_deref()).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.provision_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RunloopError::Storage(format!(
                "store provisioning task failed: {join_err}"
            ))),
            Err(_) => {
                abort.abort();
                Err(RunloopError::Storage(format!(
                    "store provisioning timed out after {:?}",
                    self.provision_timeout
                )))
            }
        }
    }

    fn primary_store(&self) -> Option<Arc<dyn CheckpointStore>> {
        match &self.active {
            Some(ActiveBackend::Primary(store)) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    /// Switch to the fallback tier for the rest of this manager's life
    fn demote(&mut self, reason: &str) {
        tracing::warn!(
            session = %self.session_id,
            reason = %reason,
            "demoting checkpoint storage to fallback"
        );
        self.active = Some(ActiveBackend::Fallback);
    }

    fn missing(&self, iteration: u32) -> RunloopError {
        RunloopError::CheckpointRecovery {
            session_id: self.session_id.clone(),
            reason: format!("no checkpoint at iteration {iteration}"),
        }
    }
}
