use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{BatchError, EditError};

/// Directory holding the change log; never walked for suggestions or backups.
pub const STATE_DIR: &str = ".linepatch";
const MAX_SUGGEST_ENTRIES: usize = 20_000;

/// Canonical project root every diff path is resolved against.
#[derive(Debug, Clone)]
pub struct ProjectRoot {
    root: PathBuf,
}

impl ProjectRoot {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let root = fs::canonicalize(path).map_err(|source| BatchError::RootInaccessible {
            path: path.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(BatchError::RootNotDirectory(root));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Joins a diff-relative path onto the root. Absolute paths, `..`
    /// components and symlinks leading outside the root are refused.
    pub fn resolve(&self, relative: &Path) -> Result<PathBuf, EditError> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(EditError::UnsafePath(relative.to_path_buf()));
                }
            }
        }
        if depth == 0 {
            return Err(EditError::UnsafePath(relative.to_path_buf()));
        }

        if let Some(existing) = nearest_existing(&resolved) {
            let canonical = fs::canonicalize(existing)
                .map_err(|err| EditError::io("resolving", existing, err))?;
            if !canonical.starts_with(&self.root) {
                return Err(EditError::UnsafePath(relative.to_path_buf()));
            }
        }
        Ok(resolved)
    }

    /// Root-relative form of a path, for messages and the change log.
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Closest existing file under the root for a path that was not found.
    /// Files sharing the name are ranked by how many trailing components they
    /// share with the request; a tie yields no suggestion.
    pub fn suggest(&self, missing: &Path) -> Option<PathBuf> {
        let needle: Vec<String> = missing
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().to_lowercase()),
                _ => None,
            })
            .collect();
        let file_name = needle.last()?.clone();

        let mut best: Option<(usize, PathBuf)> = None;
        let mut tied = false;
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry));
        for entry in walker.filter_map(|entry| entry.ok()).take(MAX_SUGGEST_ENTRIES) {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name != file_name {
                continue;
            }
            let relative = self.display_path(entry.path()).to_path_buf();
            let score = shared_suffix(&relative, &needle);
            match &best {
                Some((top, _)) if *top > score => {}
                Some((top, _)) if *top == score => tied = true,
                _ => {
                    best = Some((score, relative));
                    tied = false;
                }
            }
        }
        if tied {
            debug!(path = %missing.display(), "several candidates, no suggestion");
            return None;
        }
        best.map(|(_, path)| path)
    }
}

fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|candidate| candidate.exists())
}

fn shared_suffix(candidate: &Path, needle: &[String]) -> usize {
    let parts: Vec<String> = candidate
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    parts
        .iter()
        .rev()
        .zip(needle.iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Reserved suffixes for backups of modified and of deleted files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNaming {
    pub suffix: String,
    pub deleted_suffix: String,
}

impl Default for BackupNaming {
    fn default() -> Self {
        Self {
            suffix: ".bak".to_string(),
            deleted_suffix: ".deleted_bak".to_string(),
        }
    }
}

impl BackupNaming {
    pub fn is_backup(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return false;
        };
        let lower = name.to_ascii_lowercase();
        [&self.deleted_suffix, &self.suffix]
            .iter()
            .any(|suffix| backup_index(&lower, &suffix.to_ascii_lowercase()).is_some())
    }

    /// Existing backups of `path` with the given suffix, oldest first.
    pub fn backups_of(&self, path: &Path, suffix: &str) -> Vec<PathBuf> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return Vec::new();
        };
        let prefix = format!("{}{suffix}", name.to_string_lossy());
        let Ok(entries) = fs::read_dir(parent) else {
            return Vec::new();
        };
        let mut found: Vec<(usize, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let entry_name = entry.file_name().to_string_lossy().into_owned();
                let rest = entry_name.strip_prefix(&prefix)?;
                let index = if rest.is_empty() {
                    0
                } else if rest.chars().all(|ch| ch.is_ascii_digit()) {
                    rest.parse().ok()?
                } else {
                    return None;
                };
                Some((index, entry.path()))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, path)| path).collect()
    }
}

fn backup_index(name: &str, suffix: &str) -> Option<usize> {
    let (base, rest) = name.rsplit_once(suffix)?;
    if base.is_empty() {
        return None;
    }
    if rest.is_empty() {
        return Some(0);
    }
    if rest.chars().all(|ch| ch.is_ascii_digit()) {
        return rest.parse().ok();
    }
    None
}

pub fn backup_candidate(path: &Path, suffix: &str, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "linepatch_file".to_string());
    let backup_name = if index == 0 {
        format!("{name}{suffix}")
    } else {
        format!("{name}{suffix}{index}")
    };
    path.with_file_name(backup_name)
}

/// First unused backup name: `file.bak`, then `file.bak1`, `file.bak2`, ...
pub fn next_backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut attempt = 0usize;
    loop {
        let candidate = backup_candidate(path, suffix, attempt);
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        attempt += 1;
    }
}

/// Copies the current bytes of `path` to the next free backup name.
pub fn create_backup(path: &Path, suffix: &str) -> Result<PathBuf, EditError> {
    let backup = next_backup_path(path, suffix);
    fs::copy(path, &backup).map_err(|err| EditError::io("creating backup", &backup, err))?;
    Ok(backup)
}

/// Writes through a temporary sibling file and a rename so a crash never
/// leaves a half-written target.
pub fn write_via_temp(path: &Path, data: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(|err| EditError::io("creating directory", dir, err))?;
    }
    let base_dir = parent.unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".linepatch-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|err| EditError::io("creating temp file", &temp_path, err))?;
        let written = file.write_all(data).and_then(|()| file.sync_all());
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(EditError::io("writing temp file", &temp_path, err));
        }
    }
    fs::rename(&temp_path, path).map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        EditError::io("replacing", path, err)
    })
}

/// Backup files and moved-aside directories under the root, sorted.
pub fn find_backups(root: &ProjectRoot, naming: &BackupNaming) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut walker = WalkDir::new(root.path())
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));
    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("walking {}", root.path().display()))?;
        if entry.depth() == 0 || !naming.is_backup(entry.path()) {
            continue;
        }
        if entry.file_type().is_dir() {
            walker.skip_current_dir();
        }
        found.push(entry.into_path());
    }
    found.sort();
    Ok(found)
}

pub fn remove_backup(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("reading metadata for {}", path.display()))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("removing {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("removing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_rejects_escapes() {
        let temp = tempdir().expect("temp dir");
        let root = ProjectRoot::open(temp.path()).expect("root");
        assert!(root.resolve(Path::new("src/lib.rs")).is_ok());
        assert!(root.resolve(Path::new("./a.txt")).is_ok());
        for bad in ["../outside.txt", "src/../../x", "/etc/passwd", ".", ""] {
            let err = root.resolve(Path::new(bad)).unwrap_err();
            assert_eq!(err.kind(), "unsafe_path", "{bad}");
        }
    }

    #[test]
    fn open_fails_for_missing_root() {
        let temp = tempdir().expect("temp dir");
        let missing = temp.path().join("nope");
        assert!(matches!(
            ProjectRoot::open(&missing),
            Err(BatchError::RootInaccessible { .. })
        ));
        let file = temp.path().join("file.txt");
        fs::write(&file, "x").expect("write");
        assert!(matches!(
            ProjectRoot::open(&file),
            Err(BatchError::RootNotDirectory(_))
        ));
    }

    #[test]
    fn backup_names_increment() {
        let temp = tempdir().expect("temp dir");
        let file = temp.path().join("notes.txt");
        fs::write(&file, "v1").expect("write");
        let first = create_backup(&file, ".bak").expect("backup");
        let second = create_backup(&file, ".bak").expect("backup");
        assert_eq!(first, temp.path().join("notes.txt.bak"));
        assert_eq!(second, temp.path().join("notes.txt.bak1"));

        let naming = BackupNaming::default();
        assert_eq!(naming.backups_of(&file, ".bak"), vec![first, second]);
        assert!(naming.is_backup(Path::new("a.rs.bak12")));
        assert!(naming.is_backup(Path::new("dir.deleted_bak")));
        assert!(!naming.is_backup(Path::new("a.bakery")));
        assert!(!naming.is_backup(Path::new(".bak")));
    }

    #[test]
    fn suggest_stays_under_root() {
        let temp = tempdir().expect("temp dir");
        let nested = temp.path().join("src").join("core");
        fs::create_dir_all(&nested).expect("dirs");
        fs::write(nested.join("engine.rs"), "x").expect("write");
        fs::create_dir_all(temp.path().join("other")).expect("dirs");
        fs::write(temp.path().join("other").join("engine.rs"), "x").expect("write");

        let root = ProjectRoot::open(temp.path()).expect("root");
        assert_eq!(
            root.suggest(Path::new("lib/core/engine.rs")),
            Some(PathBuf::from("src/core/engine.rs"))
        );
        assert_eq!(root.suggest(Path::new("engine.rs")), None);
        assert_eq!(root.suggest(Path::new("missing.rs")), None);
    }

    #[test]
    fn find_backups_lists_files_and_moved_directories() {
        let temp = tempdir().expect("temp dir");
        fs::write(temp.path().join("a.txt.bak"), "x").expect("write");
        let moved = temp.path().join("old.deleted_bak");
        fs::create_dir_all(&moved).expect("dir");
        fs::write(moved.join("inner.txt.bak"), "x").expect("write");
        fs::write(temp.path().join("keep.txt"), "x").expect("write");

        let root = ProjectRoot::open(temp.path()).expect("root");
        let found = find_backups(&root, &BackupNaming::default()).expect("walk");
        let names: Vec<_> = found
            .iter()
            .map(|p| root.display_path(p).to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a.txt.bak"), PathBuf::from("old.deleted_bak")]
        );
    }

    #[test]
    fn write_via_temp_replaces_content() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("deep").join("file.txt");
        write_via_temp(&target, b"first").expect("write");
        write_via_temp(&target, b"second").expect("write");
        assert_eq!(fs::read(&target).expect("read"), b"second");
        let leftovers = fs::read_dir(target.parent().expect("parent"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1);
    }
}
