//! Active snapshot ownership.
//!
//! # Responsibilities
//! - Hand out the active snapshot to request handlers without locking
//! - Replace it atomically, only with a strictly newer version
//! - Keep the superseded snapshot around for diagnostics
//!
//! # Design Decisions
//! - Constructed with an initial snapshot, so there is never a moment
//!   without one
//! - `commit` uses a read-copy-update loop: concurrent commits resolve to
//!   the highest version regardless of arrival order
//! - `last_good` only ever moves to a newer snapshot, so racing commits
//!   settle on the predecessor of the final active version
//! - The version gauge is best-effort under racing commits
//! - Old snapshots are freed once the last in-flight request drops them

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::pipeline::compiler::ConfigSnapshot;

/// Outcome of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The candidate is now active.
    Committed { version: u64, previous: u64 },
    /// The active snapshot is as new or newer; the candidate was dropped.
    Stale { candidate: u64, active: u64 },
}

/// Owner of the active configuration snapshot.
pub struct ConfigPublisher {
    active: ArcSwap<ConfigSnapshot>,
    last_good: ArcSwapOption<ConfigSnapshot>,
}

impl ConfigPublisher {
    pub fn new(initial: ConfigSnapshot) -> Self {
        crate::observability::metrics::set_config_version(initial.version());
        Self {
            active: ArcSwap::from_pointee(initial),
            last_good: ArcSwapOption::empty(),
        }
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.active.load_full()
    }

    /// Version of the active snapshot.
    pub fn version(&self) -> u64 {
        self.active.load().version()
    }

    /// The snapshot replaced by the most recent commit, if any.
    pub fn last_good(&self) -> Option<Arc<ConfigSnapshot>> {
        self.last_good.load_full()
    }

    /// Make `candidate` active iff its version is newer than the active one.
    pub fn commit(&self, candidate: ConfigSnapshot) -> CommitOutcome {
        let candidate = Arc::new(candidate);
        let mut accepted = false;

        let previous = self.active.rcu(|current| {
            accepted = candidate.version() > current.version();
            if accepted {
                Arc::clone(&candidate)
            } else {
                Arc::clone(current)
            }
        });

        if accepted {
            let outcome = CommitOutcome::Committed {
                version: candidate.version(),
                previous: previous.version(),
            };
            self.last_good.rcu(|existing| match existing {
                Some(existing) if existing.version() >= previous.version() => {
                    Some(Arc::clone(existing))
                }
                _ => Some(Arc::clone(&previous)),
            });
            crate::observability::metrics::set_config_version(self.version());
            outcome
        } else {
            CommitOutcome::Stale {
                candidate: candidate.version(),
                active: previous.version(),
            }
        }
    }
}

impl std::fmt::Debug for ConfigPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigPublisher")
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValidator;
    use crate::pipeline::compiler::PipelineCompiler;
    use crate::policy::{builtin, Infrastructure};
    use serde_json::json;
    use std::thread;

    fn snapshot(version: u64, pipeline: &str) -> ConfigSnapshot {
        let registry = Arc::new(builtin::registry().unwrap());
        let validator = ConfigValidator::new(Arc::clone(&registry)).unwrap();
        let config = validator
            .validate(&json!({
                "http": {"port": 8080},
                "https": {"port": 8443},
                "admin": {"port": 9876},
                "apiEndpoints": {"all": {}},
                "pipelines": [{"name": pipeline, "apiEndpoints": ["all"]}]
            }))
            .unwrap();
        PipelineCompiler::new(registry, Infrastructure::new())
            .compile(config, version)
            .unwrap()
    }

    #[test]
    fn test_newer_version_replaces_active() {
        let publisher = ConfigPublisher::new(snapshot(1, "one"));
        assert!(publisher.last_good().is_none());

        let outcome = publisher.commit(snapshot(2, "two"));
        assert_eq!(outcome, CommitOutcome::Committed { version: 2, previous: 1 });
        assert_eq!(publisher.version(), 2);
        assert_eq!(publisher.current().pipelines()[0].name(), "two");
        assert_eq!(publisher.last_good().unwrap().version(), 1);
    }

    #[test]
    fn test_stale_commit_leaves_active_untouched() {
        let publisher = ConfigPublisher::new(snapshot(5, "five"));
        let before = publisher.current();

        assert_eq!(
            publisher.commit(snapshot(5, "again")),
            CommitOutcome::Stale { candidate: 5, active: 5 }
        );
        assert_eq!(
            publisher.commit(snapshot(3, "older")),
            CommitOutcome::Stale { candidate: 3, active: 5 }
        );
        assert!(Arc::ptr_eq(&before, &publisher.current()));
        assert!(publisher.last_good().is_none());
    }

    #[test]
    fn test_in_flight_reader_keeps_its_snapshot() {
        let publisher = ConfigPublisher::new(snapshot(1, "one"));
        let held = publisher.current();
        publisher.commit(snapshot(2, "two"));
        assert_eq!(held.version(), 1);
        assert_eq!(held.pipelines()[0].name(), "one");
    }

    #[test]
    fn test_concurrent_commits_settle_on_highest_version() {
        for _ in 0..20 {
            let publisher = Arc::new(ConfigPublisher::new(snapshot(1, "base")));
            let candidates: Vec<ConfigSnapshot> =
                (2..=9).map(|v| snapshot(v, &format!("v{v}"))).collect();

            let handles: Vec<_> = candidates
                .into_iter()
                .map(|candidate| {
                    let publisher = Arc::clone(&publisher);
                    thread::spawn(move || publisher.commit(candidate))
                })
                .collect();
            let outcomes: Vec<CommitOutcome> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(publisher.version(), 9);
            assert_eq!(publisher.current().pipelines()[0].name(), "v9");

            let predecessor = outcomes
                .iter()
                .find_map(|o| match o {
                    CommitOutcome::Committed { version: 9, previous } => Some(*previous),
                    _ => None,
                })
                .unwrap();
            assert_eq!(publisher.last_good().unwrap().version(), predecessor);
        }
    }
}
