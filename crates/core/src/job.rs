//! Job specification: the immutable parameters of one requested conversion.
//!
//! Clients submit a [`CreateTaskRequest`]; [`JobSpec::try_from`] validates
//! it. Invalid requests never reach the task registry.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Every LCSC component identifier starts with this prefix.
pub const LCSC_ID_PREFIX: char = 'C';

/// Maximum length of an LCSC component identifier.
const MAX_LCSC_ID_LEN: usize = 32;

/// KiCad format version used when the request does not name one.
pub const DEFAULT_KICAD_VERSION: &str = "v6";

// ---------------------------------------------------------------------------
// Wire request
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/tasks`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CreateTaskRequest {
    /// LCSC component identifier (e.g. `C8733`).
    pub lcsc_id: String,
    /// Library prefix path (e.g. `/path/to/MyLib`).
    pub output_path: String,
    #[serde(default)]
    pub overwrite: bool,
    /// Overwrite existing 3D models even if the files exist already.
    #[serde(default)]
    pub overwrite_model: bool,
    #[serde(default)]
    pub symbol: bool,
    #[serde(default)]
    pub footprint: bool,
    /// Export the 3D model.
    #[serde(default)]
    pub model: bool,
    /// `"v5"` or `"v6"`.
    #[serde(default)]
    pub kicad_version: Option<String>,
    /// Store the 3D model path relative to the project.
    #[serde(default)]
    pub project_relative: bool,
    /// Project-relative 3D model path suffix (prefixed by `${KIPRJMOD}`).
    #[serde(default)]
    pub project_relative_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Target KiCad file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KicadVersion {
    V5,
    V6,
}

impl KicadVersion {
    /// Parse the wire form (`"v5"` / `"v6"`).
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "v5" => Ok(Self::V5),
            "v6" => Ok(Self::V6),
            other => Err(CoreError::Validation(format!(
                "Unsupported KiCad version '{other}', expected 'v5' or 'v6'"
            ))),
        }
    }

    /// File extension of the symbol library for this version.
    pub fn symbol_extension(self) -> &'static str {
        match self {
            Self::V5 => "lib",
            Self::V6 => "kicad_sym",
        }
    }
}

/// Which artifacts a job should produce. At least one must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputKinds {
    pub symbol: bool,
    pub footprint: bool,
    pub model: bool,
}

impl OutputKinds {
    pub fn any(&self) -> bool {
        self.symbol || self.footprint || self.model
    }
}

/// Overwrite behaviour for existing library entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverwriteFlags {
    pub library: bool,
    pub model: bool,
}

/// Validated, immutable description of one conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub lcsc_id: String,
    pub output_prefix: String,
    pub outputs: OutputKinds,
    pub overwrite: OverwriteFlags,
    pub kicad_version: KicadVersion,
    pub project_relative: bool,
    pub project_relative_path: Option<String>,
}

impl TryFrom<CreateTaskRequest> for JobSpec {
    type Error = CoreError;

    fn try_from(request: CreateTaskRequest) -> Result<Self, Self::Error> {
        validate_lcsc_id(&request.lcsc_id)?;

        let output_prefix = request.output_path.trim().to_string();
        if output_prefix.is_empty() {
            return Err(CoreError::Validation(
                "Output path must not be empty".to_string(),
            ));
        }

        let outputs = OutputKinds {
            symbol: request.symbol,
            footprint: request.footprint,
            model: request.model,
        };
        if !outputs.any() {
            return Err(CoreError::Validation(
                "Select at least one output: symbol, footprint or model.".to_string(),
            ));
        }

        let kicad_version = KicadVersion::parse(
            request
                .kicad_version
                .as_deref()
                .unwrap_or(DEFAULT_KICAD_VERSION),
        )?;

        let project_relative_path = request
            .project_relative_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            lcsc_id: request.lcsc_id,
            output_prefix,
            outputs,
            overwrite: OverwriteFlags {
                library: request.overwrite,
                model: request.overwrite_model,
            },
            kicad_version,
            project_relative: request.project_relative,
            project_relative_path,
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an LCSC component identifier.
///
/// Rules:
/// - Must start with `C`.
/// - Must be followed by at least one ASCII alphanumeric character and
///   nothing else.
/// - Must not exceed `MAX_LCSC_ID_LEN` characters.
pub fn validate_lcsc_id(id: &str) -> Result<(), CoreError> {
    let Some(rest) = id.strip_prefix(LCSC_ID_PREFIX) else {
        return Err(CoreError::Validation(
            "LCSC ID must start with 'C'".to_string(),
        ));
    };
    if rest.is_empty() || id.len() > MAX_LCSC_ID_LEN {
        return Err(CoreError::Validation(format!(
            "LCSC ID must be between 2 and {MAX_LCSC_ID_LEN} characters"
        )));
    }
    if !rest.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation(
            "LCSC ID may only contain ASCII letters and digits".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
