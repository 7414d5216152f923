//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the mandatory first configuration cycle
//! - Initialize subsystems in dependency order
//! - Start the reload controller and, unless disabled, the file watcher
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when a snapshot is committed)
//! - Listener addresses come from the startup snapshot only

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use notify::RecommendedWatcher;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::admin::{self, auth::AdminAuth, AdminState};
use crate::config::watcher::ConfigWatcher;
use crate::config::ConfigValidator;
use crate::error::StartupError;
use crate::http::{tls::load_tls_config, GatewayServer};
use crate::lifecycle::Shutdown;
use crate::pipeline::{ConfigPublisher, ExecutionEngine, PipelineCompiler};
use crate::policy::{Infrastructure, PolicyRegistry};
use crate::reload::{ReloadController, ReloadSettings, ReloadStatus, ReloadTrigger};

/// Process-level options, independent of the configuration document.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub config_path: PathBuf,
    /// Watch the configuration file for changes.
    pub watch: bool,
    pub reload: ReloadSettings,
}

impl GatewayOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            watch: true,
            reload: ReloadSettings::default(),
        }
    }
}

/// Handles to a started gateway.
pub struct RunningGateway {
    http_addr: SocketAddr,
    https_addr: Option<SocketAddr>,
    admin_addr: SocketAddr,
    publisher: Arc<ConfigPublisher>,
    status: watch::Receiver<ReloadStatus>,
    triggers: mpsc::UnboundedSender<ReloadTrigger>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
    _watcher: Option<RecommendedWatcher>,
}

impl RunningGateway {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https_addr
    }

    pub fn admin_addr(&self) -> SocketAddr {
        self.admin_addr
    }

    pub fn publisher(&self) -> Arc<ConfigPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn status(&self) -> watch::Receiver<ReloadStatus> {
        self.status.clone()
    }

    pub fn triggers(&self) -> mpsc::UnboundedSender<ReloadTrigger> {
        self.triggers.clone()
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wait until every listener and the controller have stopped.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Gateway task failed");
            }
        }
        tracing::info!("Shutdown complete");
    }

    /// Trigger shutdown and wait for it to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.wait().await;
    }
}

async fn bind(address: String) -> Result<TcpListener, StartupError> {
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

fn watch_config(
    options: &GatewayOptions,
    triggers: mpsc::UnboundedSender<ReloadTrigger>,
) -> Result<Option<RecommendedWatcher>, StartupError> {
    if !options.watch {
        tracing::info!("Configuration watch disabled");
        return Ok(None);
    }
    Ok(Some(ConfigWatcher::new(&options.config_path, triggers).run()?))
}

/// Start the gateway: first config cycle, controller, listeners.
pub async fn start(options: GatewayOptions, registry: PolicyRegistry) -> Result<RunningGateway, StartupError> {
    let registry = Arc::new(registry);
    tracing::info!(
        policies = registry.len(),
        config = ?options.config_path,
        "policy-gateway v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let validator = ConfigValidator::new(Arc::clone(&registry))?;
    let compiler = PipelineCompiler::new(Arc::clone(&registry), Infrastructure::new());

    // Watch before the first read so no save can slip in between.
    let (triggers, trigger_rx) = mpsc::unbounded_channel();
    let watcher = watch_config(&options, triggers.clone())?;
    let controller =
        ReloadController::bootstrap(&options.config_path, validator, compiler, options.reload).await?;
    let publisher = controller.publisher();
    let status = controller.status();
    let config = publisher.current().raw().clone();

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();
    let controller_shutdown = shutdown.subscribe();
    tasks.push(tokio::spawn(controller.run(trigger_rx, controller_shutdown)));

    // Listeners start last.
    let server = GatewayServer::new(ExecutionEngine::new(Arc::clone(&publisher)));

    let http_listener = bind(config.http.bind_address()).await?;
    let http_addr = http_listener
        .local_addr()
        .map_err(|source| StartupError::Bind {
            address: config.http.bind_address(),
            source,
        })?;

    let https_addr = match &config.https.tls {
        Some(tls) => {
            let rustls = load_tls_config(tls).await.map_err(StartupError::Tls)?;
            let address = config.https.bind_address();
            let addr = tokio::net::lookup_host(&address)
                .await
                .ok()
                .and_then(|mut addrs| addrs.next())
                .ok_or_else(|| StartupError::Bind {
                    address: address.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        "could not resolve address",
                    ),
                })?;
            let server = server.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.serve_tls(addr, rustls, shutdown).await {
                    tracing::error!(error = %e, "HTTPS listener failed");
                }
            }));
            Some(addr)
        }
        None => None,
    };

    let admin_listener = bind(config.admin.bind_address()).await?;
    let admin_addr = admin_listener
        .local_addr()
        .map_err(|source| StartupError::Bind {
            address: config.admin.bind_address(),
            source,
        })?;
    let admin_router = admin::setup_admin_router(
        AdminState {
            publisher: Arc::clone(&publisher),
            registry: Arc::clone(&registry),
            status: status.clone(),
            triggers: triggers.clone(),
        },
        AdminAuth::new(config.admin.api_key.as_deref()),
    );
    {
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, admin_router, shutdown).await {
                tracing::error!(error = %e, "Admin listener failed");
            }
        }));
    }

    {
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve(http_listener, shutdown).await {
                tracing::error!(error = %e, "HTTP listener failed");
            }
        }));
    }

    Ok(RunningGateway {
        http_addr,
        https_addr,
        admin_addr,
        publisher,
        status,
        triggers,
        shutdown,
        tasks,
        _watcher: watcher,
    })
}
