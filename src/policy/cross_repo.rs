//! Cross-repo project discovery: walking sibling directories for a
//! `.roady/` workspace whose spec identifier or title matches a name.
//!
//! No persistent registry is built; discovery is re-done per policy check,
//! since the cost is small and the filesystem is self-healing.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::errors::RoadyError;
use crate::workspace::WorkspaceRepository;

const MAX_DEPTH: usize = 3;

/// A project discovered on disk: its workspace root and the repository
/// handle for reading its state/policy.
pub struct DiscoveredProject {
    pub path: PathBuf,
    pub repository: WorkspaceRepository,
}

/// Walks `start`'s parent directory tree (siblings of `start`, then their
/// children, up to `MAX_DEPTH`) for any `.roady/` directory whose spec
/// identifier or title equals `project_name`.
pub fn resolve_project(
    start: &Path,
    project_name: &str,
    cancel: &CancellationToken,
) -> Result<Option<DiscoveredProject>, RoadyError> {
    let Some(parent) = start.parent() else {
        return Ok(None);
    };

    for candidate in discover_all(parent, cancel)? {
        if cancel.is_cancelled() {
            return Err(RoadyError::Cancelled);
        }
        if let Some(spec) = candidate.repository.load_spec()? {
            if spec.id == project_name || spec.title == project_name {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Discovers every `.roady/`-backed project under `root`, up to `MAX_DEPTH`.
/// Used both by cross-repo dependency resolution and the organisation
/// service's project discovery.
pub fn discover_all(
    root: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<DiscoveredProject>, RoadyError> {
    let mut found = Vec::new();
    walk(root, 0, cancel, &mut found)?;
    Ok(found)
}

fn walk(
    dir: &Path,
    depth: usize,
    cancel: &CancellationToken,
    found: &mut Vec<DiscoveredProject>,
) -> Result<(), RoadyError> {
    if depth > MAX_DEPTH || cancel.is_cancelled() {
        return Ok(());
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    for entry in entries.flatten() {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.join(".roady").is_dir() {
            found.push(DiscoveredProject {
                repository: WorkspaceRepository::new(&path),
                path,
            });
            continue;
        }
        walk(&path, depth + 1, cancel, found)?;
    }
    Ok(())
}
