//! URI prefix to filesystem root mapping and request path resolution.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// A URI prefix bound to an absolute local directory.
#[derive(Clone, Debug)]
pub struct Mount {
    prefix: String,
    root: PathBuf,
}

impl Mount {
    /// URI prefix, always starting with `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Absolute local directory served under the prefix.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a prefix-stripped request path onto the root.
    ///
    /// `..` may only cancel a segment that was pushed before it; anything that
    /// would climb above the root is rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, MountError> {
        let mut normalized = PathBuf::new();
        let mut depth = 0usize;

        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => {
                    normalized.push(segment);
                    depth += 1;
                }
                Component::CurDir => continue,
                Component::ParentDir if depth > 0 => {
                    normalized.pop();
                    depth -= 1;
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MountError::InvalidPath);
                }
            }
        }

        Ok(self.root.join(normalized))
    }
}

/// Prefix map frozen at startup, ordered longest prefix first.
#[derive(Clone, Debug, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    /// Normalizes the configured prefix map.
    ///
    /// Keys that do not start with `/` are dropped. Roots starting with `.`
    /// are made absolute. An empty map serves the working directory at `/`.
    pub fn from_config(paths: &BTreeMap<String, String>) -> Self {
        let mut paths = paths.clone();
        if paths.is_empty() {
            paths.insert("/".to_string(), ".".to_string());
        }

        let mut mounts = Vec::with_capacity(paths.len());
        for (prefix, root) in paths {
            if !prefix.starts_with('/') {
                warn!("{prefix} -> {root} [ignored] URI path should start with '/'");
                continue;
            }
            let root = if root.starts_with('.') {
                absolutize(Path::new(&root))
            } else {
                PathBuf::from(root)
            };
            info!("{prefix} -> {}", root.display());
            mounts.push(Mount { prefix, root });
        }

        if mounts.len() > 1
            && let Some(root_mount) = mounts.iter().find(|m| m.prefix == "/")
        {
            warn!(
                "/ -> {} [shadowed at /] the multi-root index page is served for /",
                root_mount.root.display()
            );
        }

        mounts.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        Self { mounts }
    }

    /// Number of accepted mounts.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Mounts sorted by prefix, for display.
    pub fn by_prefix(&self) -> Vec<&Mount> {
        let mut mounts: Vec<&Mount> = self.mounts.iter().collect();
        mounts.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        mounts
    }

    /// Picks the longest prefix of `path` and returns it with the remainder.
    pub fn select<'a>(&'a self, path: &'a str) -> Option<(&'a Mount, &'a str)> {
        self.mounts
            .iter()
            .find(|mount| path.starts_with(&mount.prefix))
            .map(|mount| (mount, &path[mount.prefix.len()..]))
    }

    /// Returns the mount whose root contains `local`, if any.
    pub fn owning_mount(&self, local: &Path) -> Option<&Mount> {
        let local = lexical_clean(local)?;
        self.mounts
            .iter()
            .filter(|mount| lexical_clean(&mount.root).is_some_and(|root| local.starts_with(root)))
            .max_by_key(|mount| mount.root.components().count())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(abs) => lexical_clean(&abs).unwrap_or(abs),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to resolve absolute path");
            path.to_path_buf()
        }
    }
}

/// Folds `.` and `..` without touching the filesystem. `None` if `..` climbs past the start.
fn lexical_clean(path: &Path) -> Option<PathBuf> {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                if !cleaned.pop() {
                    return None;
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Some(cleaned)
}

#[derive(Debug)]
pub enum MountError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for MountError {
    fn from(err: io::Error) -> Self {
        MountError::Io(err)
    }
}
