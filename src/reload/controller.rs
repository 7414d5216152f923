//! Hot-reload state machine.
//!
//! # States
//! ```text
//!            trigger                quiet period / max wait
//!   Idle ──────────────▶ Debouncing ─────────────────────▶ Validating
//!    ▲                                                       │ ok
//!    │ failure (previous snapshot stays active)             ▼
//!    ├──────────────────────────────────────────────── Compiling
//!    │                                                       │ ok
//!    └──────────────────────────── Committing ◀─────────────┘
//! ```
//!
//! # Design Decisions
//! - One cycle at a time; triggers arriving mid-cycle wait in the channel
//!   and feed the next cycle
//! - Debouncing is bounded: a steady stream of writes still reloads once
//!   `max_debounce` has passed since the first trigger
//! - Failures never leave the controller; they are logged and counted

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::loader::read_document;
use crate::config::schema::GatewayConfig;
use crate::config::ConfigValidator;
use crate::error::ConfigError;
use crate::observability::metrics;
use crate::pipeline::{CommitOutcome, ConfigPublisher, ConfigSnapshot, PipelineCompiler};

/// Why a reload cycle was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    FileChanged,
    Signal,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Debouncing,
    Validating,
    Compiling,
    Committing,
}

/// Counters and state published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadStatus {
    pub state: ControllerState,
    pub cycles: u64,
    pub committed: u64,
    pub rejected: u64,
    pub stale: u64,
    pub last_error: Option<String>,
}

impl Default for ReloadStatus {
    fn default() -> Self {
        Self {
            state: ControllerState::Idle,
            cycles: 0,
            committed: 0,
            rejected: 0,
            stale: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSettings {
    /// Quiet period that ends a burst of triggers.
    pub debounce: Duration,
    /// Upper bound on how long a burst can delay a cycle.
    pub max_debounce: Duration,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            max_debounce: Duration::from_millis(2000),
        }
    }
}

/// Drives configuration cycles against one document on disk.
pub struct ReloadController {
    path: PathBuf,
    validator: ConfigValidator,
    compiler: PipelineCompiler,
    publisher: Arc<ConfigPublisher>,
    settings: ReloadSettings,
    status_tx: watch::Sender<ReloadStatus>,
}

impl ReloadController {
    /// Run the mandatory startup cycle and build the controller around the
    /// resulting snapshot. Any failure here is fatal to startup.
    pub async fn bootstrap(
        path: &Path,
        validator: ConfigValidator,
        compiler: PipelineCompiler,
        settings: ReloadSettings,
    ) -> Result<Self, ConfigError> {
        let config = read_and_validate(path, &validator).await?;
        let snapshot = compiler.compile(config, 1)?;
        log_commit(&snapshot);

        let status = ReloadStatus {
            cycles: 1,
            committed: 1,
            ..ReloadStatus::default()
        };
        let (status_tx, _) = watch::channel(status);

        Ok(Self {
            path: path.to_path_buf(),
            validator,
            compiler,
            publisher: Arc::new(ConfigPublisher::new(snapshot)),
            settings,
            status_tx,
        })
    }

    pub fn publisher(&self) -> Arc<ConfigPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn status(&self) -> watch::Receiver<ReloadStatus> {
        self.status_tx.subscribe()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_state(&self, state: ControllerState) {
        tracing::debug!(?state, "Reload controller transition");
        self.status_tx.send_modify(|status| status.state = state);
    }

    /// Run one validate → compile → commit cycle.
    pub async fn reload_once(&self) -> Result<CommitOutcome, ConfigError> {
        let result = self.cycle().await;

        self.status_tx.send_modify(|status| {
            status.state = ControllerState::Idle;
            status.cycles += 1;
            match &result {
                Ok(CommitOutcome::Committed { .. }) => {
                    status.committed += 1;
                    status.last_error = None;
                }
                Ok(CommitOutcome::Stale { .. }) => status.stale += 1,
                Err(e) => {
                    status.rejected += 1;
                    status.last_error = Some(e.to_string());
                }
            }
        });

        match &result {
            Ok(CommitOutcome::Committed { .. }) => metrics::record_reload("committed"),
            Ok(CommitOutcome::Stale { candidate, active }) => {
                tracing::warn!(candidate, active, "Discarded stale configuration");
                metrics::record_reload("stale");
            }
            Err(e) => {
                tracing::error!(
                    kind = e.kind(),
                    error = %e,
                    version = self.publisher.version(),
                    "Configuration rejected, keeping current snapshot"
                );
                metrics::record_reload("rejected");
            }
        }
        result
    }

    async fn cycle(&self) -> Result<CommitOutcome, ConfigError> {
        self.set_state(ControllerState::Validating);
        let config = read_and_validate(&self.path, &self.validator).await?;

        self.set_state(ControllerState::Compiling);
        let version = self.publisher.version() + 1;
        let candidate = self.compiler.compile(config, version)?;

        self.set_state(ControllerState::Committing);
        let current = self.publisher.current();
        warn_on_listener_change(current.raw(), candidate.raw());
        log_commit(&candidate);
        Ok(self.publisher.commit(candidate))
    }

    /// Process triggers until shutdown or until every sender is gone.
    pub async fn run(
        self,
        mut triggers: mpsc::UnboundedReceiver<ReloadTrigger>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(path = ?self.path, "Reload controller started");
        loop {
            self.set_state(ControllerState::Idle);
            let first = tokio::select! {
                _ = shutdown.recv() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            self.set_state(ControllerState::Debouncing);
            let mut coalesced = 0usize;
            let mut closed = false;
            let deadline = Instant::now() + self.settings.max_debounce;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let wait = self.settings.debounce.min(deadline - now);
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Reload controller stopped");
                        return;
                    }
                    next = tokio::time::timeout(wait, triggers.recv()) => match next {
                        Ok(Some(_)) => coalesced += 1,
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    },
                }
            }

            tracing::info!(trigger = ?first, coalesced, "Reloading configuration");
            let _ = self.reload_once().await;

            if closed {
                break;
            }
        }
        tracing::info!("Reload controller stopped");
    }
}

async fn read_and_validate(path: &Path, validator: &ConfigValidator) -> Result<GatewayConfig, ConfigError> {
    let raw = read_document(path).await?;
    validator.validate(&raw)
}

fn log_commit(snapshot: &ConfigSnapshot) {
    tracing::info!(
        version = snapshot.version(),
        pipelines = snapshot.pipelines().len(),
        "Configuration committed"
    );
}

fn warn_on_listener_change(current: &GatewayConfig, candidate: &GatewayConfig) {
    if current.http != candidate.http
        || current.https != candidate.https
        || current.admin != candidate.admin
    {
        tracing::warn!("Listener settings changed; restart the gateway to apply them");
    }
}
