//! Command-line arguments and artifact layout for `easyeda2kicad`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use partbridge_core::converter::ConversionResult;
use partbridge_core::job::{JobSpec, KicadVersion};

/// 3D model formats the converter writes, keyed as in
/// [`ConversionResult::model_paths`].
pub const MODEL_FORMATS: [&str; 2] = ["wrl", "step"];

/// Build the converter's argument list for `spec`.
pub fn build_converter_args(spec: &JobSpec) -> Vec<String> {
    let mut args = vec![
        "--lcsc_id".to_string(),
        spec.lcsc_id.clone(),
        "--output".to_string(),
        spec.output_prefix.clone(),
    ];

    if spec.outputs.symbol {
        args.push("--symbol".to_string());
    }
    if spec.outputs.footprint {
        args.push("--footprint".to_string());
    }
    if spec.outputs.model {
        args.push("--3d".to_string());
    }

    if spec.overwrite.library || (spec.outputs.model && spec.overwrite.model) {
        args.push("--overwrite".to_string());
    }
    if spec.kicad_version == KicadVersion::V5 {
        args.push("--v5".to_string());
    }
    if spec.project_relative {
        args.push("--project-relative".to_string());
    }

    args
}

/// Append `suffix` to the final component of `prefix`.
///
/// Unlike [`Path::with_extension`] this keeps dots already present in the
/// library name (`My.Lib` + `.pretty` is `My.Lib.pretty`).
fn with_suffix(prefix: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{suffix}"))
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Where the converter puts each requested artifact.
///
/// Symbol and footprint paths are reported whenever they were requested.
/// Model files are only reported if they exist, since the converter skips
/// formats the component does not provide.
pub fn expected_artifacts(spec: &JobSpec) -> ConversionResult {
    let prefix = spec.output_prefix.as_str();

    let symbol_path = spec.outputs.symbol.then(|| {
        display(&with_suffix(
            prefix,
            &format!(".{}", spec.kicad_version.symbol_extension()),
        ))
    });
    let footprint_path = spec
        .outputs
        .footprint
        .then(|| display(&with_suffix(prefix, ".pretty")));

    let mut model_paths = BTreeMap::new();
    if spec.outputs.model {
        let model_dir = with_suffix(prefix, ".3dshapes");
        for format in MODEL_FORMATS {
            let file = model_dir.join(format!("{}.{format}", spec.lcsc_id));
            if file.is_file() {
                model_paths.insert(format.to_string(), display(&file));
            }
        }
    }

    ConversionResult {
        symbol_path,
        footprint_path,
        model_paths,
        messages: Vec::new(),
    }
}
