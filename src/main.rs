//! policy-gateway
//!
//! An API gateway whose request handling is a configurable chain of
//! policies, hot-reloaded from a YAML or TOML document.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                  POLICY GATEWAY                  │
//!                       │                                                  │
//!   config file ───────▶│  watcher ─▶ reload controller                    │
//!   SIGHUP / admin ────▶│               │ validate ─▶ compile ─▶ commit    │
//!                       │               ▼                                  │
//!                       │          ┌───────────┐                           │
//!                       │          │ publisher │ (active snapshot)         │
//!                       │          └─────┬─────┘                           │
//!                       │                │ current()                       │
//!   Client Request ────▶│  http server ─▶ engine ─▶ policy chain ──────────┼──▶ service
//!                       │                                                  │    endpoints
//!                       │  admin API (status, config, reload, keys)        │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use policy_gateway::lifecycle::{self, signals, GatewayOptions};
use policy_gateway::observability::{logging, metrics};
use policy_gateway::policy::builtin;
use policy_gateway::reload::ReloadSettings;

const DEFAULT_CONFIG_FILE: &str = "gateway.config.yml";

#[derive(Parser, Debug)]
#[command(name = "policy-gateway", version, about = "Policy-driven API gateway")]
struct Args {
    /// Path to the gateway configuration document (YAML or TOML).
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding `gateway.config.yml`, used when --config is absent.
    #[arg(long, env = "GATEWAY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(
        long,
        env = "GATEWAY_DISABLE_CONFIG_WATCH",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        value_parser = parse_switch
    )]
    disable_watch: bool,

    /// Quiet period that ends a burst of configuration changes.
    #[arg(long, default_value_t = 200)]
    debounce_ms: u64,

    /// Longest a burst of changes may delay a reload.
    #[arg(long, default_value_t = 2000)]
    max_debounce_ms: u64,

    /// Expose Prometheus metrics on this address.
    #[arg(long, env = "GATEWAY_METRICS_ADDRESS")]
    metrics_address: Option<SocketAddr>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

/// Any value other than empty, `0` or `false` turns the switch on.
fn parse_switch(value: &str) -> Result<bool, String> {
    let value = value.trim().to_ascii_lowercase();
    Ok(!matches!(value.as_str(), "" | "0" | "false"))
}

impl Args {
    fn config_path(&self) -> PathBuf {
        match (&self.config, &self.config_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(DEFAULT_CONFIG_FILE),
            (None, None) => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    fn options(&self) -> GatewayOptions {
        GatewayOptions {
            config_path: self.config_path(),
            watch: !self.disable_watch,
            reload: ReloadSettings {
                debounce: Duration::from_millis(self.debounce_ms),
                max_debounce: Duration::from_millis(self.max_debounce_ms.max(self.debounce_ms)),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_logging(args.log_json);

    if let Some(addr) = args.metrics_address {
        metrics::init_metrics(addr);
    }

    let registry = builtin::registry()?;
    let gateway = lifecycle::start(args.options(), registry).await?;

    tracing::info!(
        http = %gateway.http_addr(),
        admin = %gateway.admin_addr(),
        version = gateway.publisher().version(),
        "Gateway ready"
    );

    signals::spawn_signal_handlers(gateway.shutdown(), gateway.triggers());
    gateway.wait().await;
    Ok(())
}
