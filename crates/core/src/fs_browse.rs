//! Filesystem browsing helpers backing the directory picker.
//!
//! All functions are synchronous and side-effect free apart from reading
//! directory metadata.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Home subdirectories offered as shortcuts when they exist.
const HOME_SHORTCUTS: [&str; 3] = ["Documents", "Downloads", "Desktop"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsRoot {
    pub path: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: String,
    pub parent: Option<String>,
    pub entries: Vec<DirEntryInfo>,
    pub breadcrumbs: Vec<Breadcrumb>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathCheck {
    pub requested: String,
    pub resolved: String,
    pub exists: bool,
    pub is_dir: bool,
    pub writable: bool,
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                None => PathBuf::from(path),
            }
        }
        _ => PathBuf::from(path),
    }
}

/// Make `path` absolute, resolving symlinks where the path exists.
///
/// Missing paths are normalized lexically instead of failing.
pub fn resolve_lenient(path: &str) -> io::Result<PathBuf> {
    let expanded = expand_home(path);
    if let Ok(canonical) = fs::canonicalize(&expanded) {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(&expanded)?;
    Ok(normalize(&absolute))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether the current process may write into `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Whether the current process may write into `path`.
#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Filesystem roots plus the home directory and common home folders.
pub fn roots() -> Vec<FsRoot> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();

    let mut push = |path: PathBuf, label: String| {
        let key = display(&path);
        if seen.insert(key.clone()) {
            roots.push(FsRoot { path: key, label });
        }
    };

    if cfg!(windows) {
        for letter in 'A'..='Z' {
            let drive = PathBuf::from(format!("{letter}:\\"));
            if drive.exists() {
                push(drive, format!("{letter}:\\"));
            }
        }
    } else {
        push(PathBuf::from("/"), "/".to_string());
    }

    if let Some(home) = dirs::home_dir() {
        let home = fs::canonicalize(&home).unwrap_or(home);
        push(home.clone(), display(&home));
        for shortcut in HOME_SHORTCUTS {
            let candidate = home.join(shortcut);
            if let Ok(resolved) = fs::canonicalize(&candidate) {
                push(resolved.clone(), display(&resolved));
            }
        }
    }

    roots
}

/// List the entries of a directory, directories first.
pub fn list_directory(path: &str) -> CoreResult<DirectoryListing> {
    let target =
        resolve_lenient(path).map_err(|_| CoreError::Validation(format!("Invalid path: {path}")))?;

    if !target.exists() {
        return Err(CoreError::NotFound {
            entity: "Path",
            id: path.to_string(),
        });
    }
    if !target.is_dir() {
        return Err(CoreError::Validation(format!(
            "Path is not a directory: {path}"
        )));
    }

    let read_dir = fs::read_dir(&target).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => {
            CoreError::Forbidden(format!("Access denied for directory: {path}"))
        }
        _ => CoreError::Internal(format!("Unable to read directory {path}: {e}")),
    })?;

    let mut entries: Vec<DirEntryInfo> = read_dir
        .filter_map(Result::ok)
        .map(|entry| {
            let entry_path = entry.path();
            let file_type = entry.file_type().ok();
            DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: display(&entry_path),
                is_dir: file_type.is_some_and(|t| t.is_dir()),
                is_symlink: file_type.is_some_and(|t| t.is_symlink()),
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    let parent = target.parent().map(display);

    let mut breadcrumbs: Vec<Breadcrumb> = target
        .ancestors()
        .map(|ancestor| Breadcrumb {
            label: ancestor
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| display(ancestor)),
            path: display(ancestor),
        })
        .collect();
    breadcrumbs.reverse();

    Ok(DirectoryListing {
        path: display(&target),
        parent,
        entries,
        breadcrumbs,
    })
}

/// Report whether `path` exists and whether it (or its parent) is writable.
pub fn check_path(path: &str) -> PathCheck {
    let target = expand_home(path);
    let resolved = resolve_lenient(path).unwrap_or_else(|_| target.clone());
    let exists = target.exists();
    let is_dir = target.is_dir();

    let writable = if exists && is_dir {
        is_writable(&target)
    } else {
        target
            .parent()
            .is_some_and(|parent| parent.exists() && is_writable(parent))
    };

    PathCheck {
        requested: path.to_string(),
        resolved: display(&resolved),
        exists,
        is_dir,
        writable,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
