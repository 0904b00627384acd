//! Per-project `.roady/` directory: atomic persistence for every domain
//! entity plus the append-only event log.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::domain::{Event, ExecutionState, Plan, PolicyConfig, ProductSpec};
use crate::errors::RoadyError;
use crate::workspace::types::{OrgConfig, PluginConfigs, RatesFile, Team, TimeEntriesFile, UsageStats};

const DIR_NAME: &str = ".roady";

/// Owns all reads/writes to one project's `.roady/` directory. Domain
/// objects handed back to callers are owned copies: mutating one and
/// dropping it has no effect on disk. Only `save_*` methods persist.
pub struct WorkspaceRepository {
    root: PathBuf,
}

impl WorkspaceRepository {
    /// `project_dir` is the project's root; the workspace lives at
    /// `project_dir/.roady`.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: project_dir.into().join(DIR_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates the `.roady/` directory with owner-only permissions.
    /// Idempotent only if the directory is empty or absent; otherwise fails
    /// with `AlreadyInitialized`.
    pub fn initialize(&self) -> Result<(), RoadyError> {
        if self.root.exists() {
            let has_entries = fs::read_dir(&self.root)?.next().is_some();
            if has_entries {
                return Err(RoadyError::AlreadyInitialized(
                    self.root.display().to_string(),
                ));
            }
        } else {
            fs::create_dir_all(&self.root)?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.root, fs::Permissions::from_mode(0o700))?;
        }

        debug!(path = %self.root.display(), "workspace initialized");
        Ok(())
    }

    /// Writes `bytes` to `path` by writing a sibling temp file in the same
    /// directory then renaming over the target, so a crash mid-write can
    /// never leave a half-written file at `path`.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), RoadyError> {
        let dir = path.parent().ok_or_else(|| {
            RoadyError::SaveFailed(path.display().to_string(), "no parent directory".into())
        })?;
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| RoadyError::SaveFailed(path.display().to_string(), e.to_string()))?;
        Ok(())
    }

    fn save_yaml<T: Serialize>(&self, name: &str, value: &T) -> Result<(), RoadyError> {
        let path = self.file(name);
        let bytes = serde_yaml::to_string(value)?.into_bytes();
        self.write_atomic(&path, &bytes)
            .map_err(|e| RoadyError::SaveFailed(name.to_string(), e.to_string()))?;
        debug!(file = name, "saved");
        Ok(())
    }

    /// Loads `name` as YAML, or `None` if the file is missing. A file that
    /// exists but fails to parse is a `LoadFailed` error, never a neutral
    /// default.
    fn load_yaml_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, RoadyError> {
        let path = self.file(name);
        match fs::read(&path) {
            Ok(bytes) => serde_yaml::from_slice(&bytes)
                .map(Some)
                .map_err(|e| RoadyError::LoadFailed(name.to_string(), e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RoadyError::LoadFailed(name.to_string(), e.to_string())),
        }
    }

    fn load_yaml_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, RoadyError> {
        Ok(self.load_yaml_opt(name)?.unwrap_or_default())
    }

    // --- Spec / locked spec ---

    pub fn save_spec(&self, spec: &ProductSpec) -> Result<(), RoadyError> {
        self.save_yaml("spec.yaml", spec)
    }

    /// Returns `None` if no spec has ever been saved — the one load that is
    /// not neutral-defaulted, since a missing spec is meaningfully different
    /// from an empty one.
    pub fn load_spec(&self) -> Result<Option<ProductSpec>, RoadyError> {
        self.load_yaml_opt("spec.yaml")
    }

    pub fn save_locked_spec(&self, spec: &ProductSpec) -> Result<(), RoadyError> {
        self.save_yaml("spec.lock.yaml", spec)
    }

    pub fn load_locked_spec(&self) -> Result<Option<ProductSpec>, RoadyError> {
        self.load_yaml_opt("spec.lock.yaml")
    }

    // --- Plan ---

    pub fn save_plan(&self, plan: &Plan) -> Result<(), RoadyError> {
        self.save_yaml("plan.yaml", plan)
    }

    pub fn load_plan(&self) -> Result<Option<Plan>, RoadyError> {
        self.load_yaml_opt("plan.yaml")
    }

    // --- Execution state ---

    pub fn save_state(&self, state: &ExecutionState) -> Result<(), RoadyError> {
        self.save_yaml("state.yaml", state)
    }

    pub fn load_state(&self, project_id: &str) -> Result<ExecutionState, RoadyError> {
        Ok(self
            .load_yaml_opt("state.yaml")?
            .unwrap_or_else(|| ExecutionState::new(project_id)))
    }

    // --- Policy ---

    pub fn save_policy(&self, policy: &PolicyConfig) -> Result<(), RoadyError> {
        self.save_yaml("policy.yaml", policy)
    }

    pub fn load_policy(&self) -> Result<PolicyConfig, RoadyError> {
        self.load_yaml_default("policy.yaml")
    }

    // --- Rates / time entries ---

    pub fn save_rates(&self, rates: &RatesFile) -> Result<(), RoadyError> {
        self.save_yaml("rates.yaml", rates)
    }

    pub fn load_rates(&self) -> Result<RatesFile, RoadyError> {
        self.load_yaml_default("rates.yaml")
    }

    pub fn save_time_entries(&self, entries: &TimeEntriesFile) -> Result<(), RoadyError> {
        self.save_yaml("time_entries.yaml", entries)
    }

    pub fn load_time_entries(&self) -> Result<TimeEntriesFile, RoadyError> {
        self.load_yaml_default("time_entries.yaml")
    }

    // --- Plugins / team ---

    pub fn load_plugin_configs(&self) -> Result<PluginConfigs, RoadyError> {
        self.load_yaml_default("plugins.yaml")
    }

    pub fn save_plugin_configs(&self, configs: &PluginConfigs) -> Result<(), RoadyError> {
        self.save_yaml("plugins.yaml", configs)
    }

    pub fn load_team(&self) -> Result<Team, RoadyError> {
        self.load_yaml_default("team.yaml")
    }

    pub fn save_team(&self, team: &Team) -> Result<(), RoadyError> {
        self.save_yaml("team.yaml", team)
    }

    // --- Usage ---

    pub fn load_usage(&self) -> Result<UsageStats, RoadyError> {
        self.load_yaml_default("usage.yaml")
    }

    /// Read-modify-write: loads current usage, applies `f`, saves the result.
    pub fn update_usage(
        &self,
        f: impl FnOnce(&mut UsageStats),
    ) -> Result<UsageStats, RoadyError> {
        let mut usage = self.load_usage()?;
        f(&mut usage);
        usage.last_updated = Some(chrono::Utc::now());
        self.save_yaml("usage.yaml", &usage)?;
        Ok(usage)
    }

    // --- Org (organisation root only) ---

    pub fn load_org(&self) -> Result<Option<OrgConfig>, RoadyError> {
        self.load_yaml_opt("org.yaml")
    }

    pub fn save_org(&self, org: &OrgConfig) -> Result<(), RoadyError> {
        self.save_yaml("org.yaml", org)
    }

    // --- Event log ---

    fn events_path(&self) -> PathBuf {
        self.file("events.jsonl")
    }

    /// Returns every successfully-parsed line, discarding a truncated final
    /// line (the signature of a crash mid-append) rather than failing the
    /// load. The drop itself is not silent: `load_events_with_diagnostics`
    /// carries it forward as a diagnostic string, which `verify_integrity`
    /// turns into a violation.
    pub fn load_events(&self) -> Result<Vec<Event>, RoadyError> {
        Ok(self.load_events_with_diagnostics()?.0)
    }

    /// Like `load_events`, but also returns one diagnostic string per
    /// dropped line so a caller that cares (`EventStore::verify_integrity`)
    /// can surface the drop instead of it vanishing into a `tracing::warn!`.
    pub fn load_events_with_diagnostics(&self) -> Result<(Vec<Event>, Vec<String>), RoadyError> {
        let path = self.events_path();
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => return Err(RoadyError::LoadFailed("events.jsonl".into(), e.to_string())),
        };
        Self::parse_events(&contents)
    }

    fn parse_events(contents: &str) -> Result<(Vec<Event>, Vec<String>), RoadyError> {
        let lines: Vec<&str> = contents.lines().collect();
        let mut events = Vec::new();
        let mut diagnostics = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    if idx == lines.len().saturating_sub(1) {
                        warn!(error = %e, "ignoring unparseable final event line (likely a crash mid-append)");
                        diagnostics.push(format!(
                            "events.jsonl line {} is truncated and was dropped; effective tail is the last fully-parseable event ({e})",
                            idx + 1
                        ));
                    } else {
                        return Err(RoadyError::LoadFailed("events.jsonl".into(), e.to_string()));
                    }
                }
            }
        }
        Ok((events, diagnostics))
    }

    pub fn tail_hash(&self) -> Result<String, RoadyError> {
        Ok(self
            .load_events()?
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_default())
    }

    /// Appends `event` to `events.jsonl`. Never overwrites; fails if
    /// `event.prev_hash` does not match the store's current tail hash.
    pub fn record_event(&self, event: &Event) -> Result<(), RoadyError> {
        let tail = self.tail_hash()?;
        if event.prev_hash != tail {
            return Err(RoadyError::HashMismatch {
                expected: tail,
                actual: event.prev_hash.clone(),
            });
        }

        let path = self.events_path();
        fs::create_dir_all(self.root.clone())?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApprovalStatus, Plan};
    use std::collections::HashMap;

    fn repo() -> (tempfile::TempDir, WorkspaceRepository) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = WorkspaceRepository::new(dir.path());
        (dir, repo)
    }

    #[test]
    fn initialize_creates_directory_and_is_idempotent_when_empty() {
        let (_dir, repo) = repo();
        repo.initialize().expect("first init");
        repo.initialize().expect("second init on empty dir is ok");
        assert!(repo.path().is_dir());
    }

    #[test]
    fn initialize_fails_when_directory_has_contents() {
        let (_dir, repo) = repo();
        repo.initialize().expect("init");
        fs::write(repo.path().join("spec.yaml"), "id: s1\n").unwrap();
        let err = repo.initialize().unwrap_err();
        assert!(matches!(err, RoadyError::AlreadyInitialized(_)));
    }

    #[test]
    fn missing_spec_loads_as_none_but_missing_policy_is_a_default() {
        let (_dir, repo) = repo();
        repo.initialize().unwrap();
        assert!(repo.load_spec().unwrap().is_none());
        let policy = repo.load_policy().unwrap();
        assert_eq!(policy.max_wip, 0);
    }

    #[test]
    fn save_then_load_plan_round_trips() {
        let (_dir, repo) = repo();
        repo.initialize().unwrap();
        let plan = Plan {
            id: "p1".into(),
            spec_id: "s1".into(),
            approval_status: ApprovalStatus::Approved,
            tasks: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        repo.save_plan(&plan).unwrap();
        let loaded = repo.load_plan().unwrap().unwrap();
        assert_eq!(loaded.id, "p1");
        assert_eq!(loaded.approval_status, ApprovalStatus::Approved);
    }

    #[test]
    fn record_event_enforces_hash_chain() {
        let (_dir, repo) = repo();
        repo.initialize().unwrap();
        let e1 = Event::next("plan.generate", "cli", HashMap::new(), repo.tail_hash().unwrap());
        repo.record_event(&e1).unwrap();

        let bad = Event::next("plan.approve", "cli", HashMap::new(), "not-the-tail");
        let err = repo.record_event(&bad).unwrap_err();
        assert!(matches!(err, RoadyError::HashMismatch { .. }));

        let e2 = Event::next("plan.approve", "cli", HashMap::new(), repo.tail_hash().unwrap());
        repo.record_event(&e2).unwrap();

        let events = repo.load_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].prev_hash, events[0].hash);
    }

    #[test]
    fn crash_truncated_final_line_is_skipped_not_fatal() {
        let (_dir, repo) = repo();
        repo.initialize().unwrap();
        let e1 = Event::next("plan.generate", "cli", HashMap::new(), repo.tail_hash().unwrap());
        repo.record_event(&e1).unwrap();

        let mut contents = fs::read_to_string(repo.file("events.jsonl")).unwrap();
        contents.push_str("{\"id\":\"not-finished");
        fs::write(repo.file("events.jsonl"), contents).unwrap();

        let events = repo.load_events().unwrap();
        assert_eq!(events.len(), 1);

        let (events, diagnostics) = repo.load_events_with_diagnostics().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("truncated"));
    }
}
