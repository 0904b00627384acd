//! Contracts for collaborators the core consumes but does not implement:
//! the AI provider, the code inspector, version control, and plugin
//! syncers. Each is a trait so a CLI or test can supply a stub.

use async_trait::async_trait;

use crate::domain::{ExecutionState, Plan};
use crate::errors::RoadyError;

/// A single completion call. The core is unaware of the wire protocol an
/// implementation uses to talk to a model provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait AIProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, RoadyError>;
}

/// Git status of a task's recorded implementation path, as seen by the
/// code drift detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStatus {
    Clean,
    Modified,
    Untracked,
    Ignored,
    Missing,
    Error,
}

pub trait CodeInspector: Send + Sync {
    fn file_exists(&self, path: &str) -> bool;
    fn file_not_empty(&self, path: &str) -> bool;
    fn git_status(&self, path: &str) -> GitStatus;
}

/// Opaque version-control commands. A non-zero exit is surfaced as an
/// error carrying a stderr excerpt; each command has a 30s timeout.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn status(&self) -> Result<String, RoadyError>;
    async fn add(&self, path: &str) -> Result<(), RoadyError>;
    async fn commit(&self, message: &str) -> Result<(), RoadyError>;
    async fn push(&self) -> Result<(), RoadyError>;
    async fn pull_rebase(&self) -> Result<(), RoadyError>;
    async fn stash_push(&self) -> Result<(), RoadyError>;
    async fn stash_pop(&self) -> Result<(), RoadyError>;
    async fn log(&self) -> Result<String, RoadyError>;
}

#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub link_updates: u32,
    pub status_updates: u32,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait PluginSyncer: Send + Sync {
    async fn init(&self, config: &serde_json::Value) -> Result<(), RoadyError>;
    async fn sync(&self, plan: &Plan, state: &ExecutionState) -> Result<SyncOutcome, RoadyError>;
}

#[cfg(test)]
pub mod stub {
    //! In-memory stand-ins used by drift/billing/app tests.
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct StubCodeInspector {
        pub files: Mutex<HashMap<String, (bool, GitStatus)>>,
    }

    impl StubCodeInspector {
        pub fn set(&self, path: &str, not_empty: bool, status: GitStatus) {
            self.files.lock().unwrap().insert(path.to_string(), (not_empty, status));
        }
    }

    impl CodeInspector for StubCodeInspector {
        fn file_exists(&self, path: &str) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        fn file_not_empty(&self, path: &str) -> bool {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|(not_empty, _)| *not_empty)
                .unwrap_or(false)
        }

        fn git_status(&self, path: &str) -> GitStatus {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|(_, status)| *status)
                .unwrap_or(GitStatus::Missing)
        }
    }
}
