//! KiCad library scaffolding and inspection.
//!
//! A library is addressed by its *prefix* `<dir>/<name>`; its parts live
//! next to it as `<name>.kicad_sym` (or `<name>.lib` for KiCad 5),
//! `<name>.pretty/` (footprints) and `<name>.3dshapes/` (3D models).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs_browse::{is_writable, resolve_lenient};

/// Extension of the footprint library directory.
pub const FOOTPRINT_DIR_EXT: &str = "pretty";

/// Extension of the 3D model directory.
pub const MODEL_DIR_EXT: &str = "3dshapes";

/// Contents written to a freshly scaffolded symbol library.
const EMPTY_SYMBOL_LIBRARY: &str = "(kicad_symbol_lib\n  (version 20211014)\n  (generator partbridge)\n)";

static SYMBOL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*symbol\b").expect("static regex is valid"));

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Scaffold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScaffoldRequest {
    /// Base directory for the library.
    pub base_path: String,
    /// Library name without extension.
    pub library_name: String,
    #[serde(default = "default_true")]
    pub symbol: bool,
    #[serde(default = "default_true")]
    pub footprint: bool,
    #[serde(default = "default_true")]
    pub model: bool,
    #[serde(default)]
    pub project_relative: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldOutcome {
    pub resolved_library_prefix: String,
    pub symbol_path: Option<String>,
    pub footprint_dir: Option<String>,
    pub model_dir: Option<String>,
    /// Which targets were newly created by this call.
    pub created: BTreeMap<String, bool>,
}

/// Create the selected parts of a library, leaving existing files alone.
///
/// The model directory is also created when only footprints are requested,
/// since footprints reference their 3D models.
pub fn scaffold_library(request: &ScaffoldRequest) -> CoreResult<ScaffoldOutcome> {
    if !(request.symbol || request.footprint || request.model) {
        return Err(CoreError::Validation(
            "Select at least one scaffold target.".to_string(),
        ));
    }

    let prefix = library_prefix(&request.base_path, &request.library_name)?;
    if let Some(parent) = prefix.parent() {
        ensure_writable_dir(parent)?;
    }

    let mut created: BTreeMap<String, bool> = ["symbol", "footprint", "model"]
        .into_iter()
        .map(|k| (k.to_string(), false))
        .collect();

    if !prefix.exists() {
        fs::create_dir(&prefix).map_err(|e| {
            forbidden(format!("Unable to create library folder: {}", prefix.display()), e)
        })?;
    }

    let symbol_file = prefix.with_extension("kicad_sym");
    let mut symbol_path = None;
    if request.symbol {
        if !symbol_file.exists() {
            fs::write(&symbol_file, EMPTY_SYMBOL_LIBRARY).map_err(|e| {
                forbidden(format!("Unable to create symbol file: {}", symbol_file.display()), e)
            })?;
            created.insert("symbol".to_string(), true);
        }
        symbol_path = Some(display(&symbol_file));
    } else if symbol_file.exists() {
        symbol_path = Some(display(&symbol_file));
    }

    let footprint_path = prefix.with_extension(FOOTPRINT_DIR_EXT);
    let mut footprint_dir = None;
    if request.footprint {
        if !footprint_path.exists() {
            fs::create_dir(&footprint_path).map_err(|e| {
                forbidden(
                    format!("Unable to create footprint folder: {}", footprint_path.display()),
                    e,
                )
            })?;
            created.insert("footprint".to_string(), true);
        }
        footprint_dir = Some(display(&footprint_path));
    } else if footprint_path.exists() {
        footprint_dir = Some(display(&footprint_path));
    }

    let mut model_dir = None;
    if request.model || request.footprint {
        let model_path = prefix.with_extension(MODEL_DIR_EXT);
        if !model_path.exists() {
            fs::create_dir(&model_path).map_err(|e| {
                forbidden(format!("Unable to create 3D folder: {}", model_path.display()), e)
            })?;
            created.insert("model".to_string(), true);
        }
        model_dir = Some(display(&model_path));
    }

    Ok(ScaffoldOutcome {
        resolved_library_prefix: display(&prefix),
        symbol_path,
        footprint_dir,
        model_dir,
        created,
    })
}

/// Join a base directory and a bare library name into a resolved prefix.
fn library_prefix(base_path: &str, library_name: &str) -> CoreResult<PathBuf> {
    let base = resolve_lenient(base_path)
        .map_err(|_| CoreError::Validation(format!("Invalid base path: {base_path}")))?;

    let name = library_name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Library name must not be empty.".to_string(),
        ));
    }
    if name.contains(['/', '\\']) {
        return Err(CoreError::Validation(
            "Library name must not contain path separators.".to_string(),
        ));
    }
    Ok(base.join(name))
}

fn ensure_writable_dir(path: &Path) -> CoreResult<()> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            forbidden(format!("Missing permissions for '{}'.", path.display()), e)
        })?;
    }
    if !is_writable(path) {
        return Err(CoreError::Forbidden(format!(
            "Directory not writable: {}",
            path.display()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryReport {
    pub resolved_path: String,
    pub exists: bool,
    pub is_dir: bool,
    pub writable: bool,
    pub assets: BTreeMap<String, bool>,
    pub counts: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
}

/// Describe the library at `path`, which may be a prefix or a symbol file.
pub fn inspect_library(path: &str) -> CoreResult<LibraryReport> {
    let resolved =
        resolve_lenient(path).map_err(|_| CoreError::Validation(format!("Invalid path: {path}")))?;
    let is_dir = resolved.is_dir();
    let is_file = resolved.is_file();

    let mut assets: BTreeMap<String, bool> = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for kind in ["symbol", "footprint", "model"] {
        assets.insert(kind.to_string(), false);
        counts.insert(kind.to_string(), 0);
    }
    let mut warnings = Vec::new();

    let extension = resolved
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    let (symbol_candidates, library_root) =
        if is_file && matches!(extension.as_deref(), Some("kicad_sym" | "lib")) {
            (vec![resolved.clone()], resolved.with_extension(""))
        } else {
            (
                vec![
                    resolved.with_extension("kicad_sym"),
                    resolved.with_extension("lib"),
                ],
                resolved.clone(),
            )
        };

    let symbol_file = symbol_candidates.into_iter().find(|c| c.is_file());
    if let Some(file) = &symbol_file {
        assets.insert("symbol".to_string(), true);
        counts.insert("symbol".to_string(), count_symbols(file));
    }

    let footprint_dir = library_root.with_extension(FOOTPRINT_DIR_EXT);
    let footprint_exists = footprint_dir.is_dir();
    if footprint_exists {
        assets.insert("footprint".to_string(), true);
        counts.insert(
            "footprint".to_string(),
            count_files(&footprint_dir, |ext| ext == "kicad_mod"),
        );
    }

    let model_dir = library_root.with_extension(MODEL_DIR_EXT);
    let model_exists = model_dir.is_dir();
    if model_exists {
        assets.insert("model".to_string(), true);
        counts.insert(
            "model".to_string(),
            count_files(&model_dir, |ext| ext.eq_ignore_ascii_case("wrl")),
        );
    }

    let exists = resolved.exists() || symbol_file.is_some() || footprint_exists || model_exists;

    let writable = if let Some(file) = &symbol_file {
        let writable = file.parent().is_some_and(is_writable);
        if !writable {
            warnings.push("Library file cannot be overwritten.".to_string());
        }
        writable
    } else if exists && is_dir {
        let writable = is_writable(&resolved);
        if !writable {
            warnings.push("Directory is not writable.".to_string());
        }
        writable
    } else {
        match resolved.parent() {
            Some(parent) if parent.exists() => {
                let writable = is_writable(parent);
                if !writable {
                    warnings.push("Parent directory is not writable.".to_string());
                }
                writable
            }
            _ => {
                warnings.push("Parent directory does not exist.".to_string());
                false
            }
        }
    };

    Ok(LibraryReport {
        resolved_path: display(symbol_file.as_ref().unwrap_or(&resolved)),
        exists,
        is_dir,
        writable,
        assets,
        counts,
        warnings,
    })
}

/// Count `(symbol` forms in a symbol library. Unreadable or empty-looking
/// files count as one symbol.
fn count_symbols(path: &Path) -> usize {
    match fs::read(path) {
        Ok(bytes) => SYMBOL_PATTERN
            .find_iter(&String::from_utf8_lossy(&bytes))
            .count()
            .max(1),
        Err(_) => 1,
    }
}

fn count_files(dir: &Path, matches_ext: impl Fn(&str) -> bool) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| matches_ext(&ext.to_string_lossy()))
        })
        .count()
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn forbidden(message: String, err: io::Error) -> CoreError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => CoreError::Forbidden(message),
        _ => CoreError::Forbidden(format!("{message} ({err})")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
