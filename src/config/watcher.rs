//! Configuration file watcher for hot reload.
//!
//! The watcher only reports that something changed; reading, validating
//! and committing belong to the reload controller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::reload::ReloadTrigger;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    trigger_tx: mpsc::UnboundedSender<ReloadTrigger>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, trigger_tx: mpsc::UnboundedSender<ReloadTrigger>) -> Self {
        Self {
            path: path.to_path_buf(),
            trigger_tx,
        }
    }

    /// Start watching. The returned guard must be kept alive for as long as
    /// notifications are wanted.
    ///
    /// The parent directory is watched rather than the file itself so
    /// editors that save by rename keep being observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.trigger_tx;
        let file_name = self.path.file_name().map(|name| name.to_os_string());
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant {
                        tracing::debug!(kind = ?event.kind, "Config file change detected");
                        let _ = tx.send(ReloadTrigger::FileChanged);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_produces_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.config.yml");
        std::fs::write(&path, "a: 1\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = ConfigWatcher::new(&path, tx).run().unwrap();

        std::fs::write(&path, "a: 2\n").unwrap();
        let trigger = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(trigger, Some(ReloadTrigger::FileChanged));
    }

    #[tokio::test]
    async fn test_other_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.config.yml");
        std::fs::write(&path, "a: 1\n").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = ConfigWatcher::new(&path, tx).run().unwrap();

        std::fs::write(dir.path().join("unrelated.txt"), "x").unwrap();
        let trigger = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(trigger.is_err());
    }
}
