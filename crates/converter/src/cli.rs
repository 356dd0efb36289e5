//! Run `easyeda2kicad` as a child process.

use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use partbridge_core::converter::{
    ConversionError, ConversionResult, ConversionStage, Converter, ProgressSink,
};
use partbridge_core::job::JobSpec;

use crate::command::{build_converter_args, expected_artifacts};

/// Program name used when none is configured.
pub const DEFAULT_PROGRAM: &str = "easyeda2kicad";

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 5;

const FETCHING_PERCENT: i64 = 10;
const SYMBOL_PERCENT: i64 = 40;
const FOOTPRINT_PERCENT: i64 = 65;
const MODEL_PERCENT: i64 = 90;

/// Converter backed by the `easyeda2kicad` executable.
#[derive(Debug, Clone)]
pub struct CliConverter {
    program: String,
}

impl CliConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CliConverter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Converter for CliConverter {
    fn convert(
        &self,
        spec: &JobSpec,
        progress: &ProgressSink,
    ) -> Result<ConversionResult, ConversionError> {
        if let Some(parent) = Path::new(&spec.output_prefix).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let args = build_converter_args(spec);
        tracing::info!(program = %self.program, ?args, "Running converter");
        progress.report(
            ConversionStage::Fetching,
            FETCHING_PERCENT,
            format!("Fetching {} from EasyEDA", spec.lcsc_id),
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConversionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut transcript = Transcript::default();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            if let Some(out) = stdout {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(out, Stream::Stdout, tx));
            }
            if let Some(err) = stderr {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(err, Stream::Stderr, tx));
            }
            drop(tx);

            for (stream, line) in rx {
                transcript.observe(stream, &line, progress);
            }
        });

        let status = child.wait()?;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            tracing::warn!(program = %self.program, code, "Converter exited with failure");
            return Err(ConversionError::Exit {
                code,
                detail: transcript.failure_detail(),
            });
        }

        let mut result = expected_artifacts(spec);
        result.messages = transcript.messages;
        progress.report(
            ConversionStage::Completed,
            100,
            format!("Converted {}", spec.lcsc_id),
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Output handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R: Read>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if tx.send((stream, line)).is_err() {
            break;
        }
    }
}

/// Map a converter log line to the stage it announces, if any.
pub(crate) fn classify_line(line: &str) -> Option<ConversionStage> {
    let lower = line.to_ascii_lowercase();
    if lower.contains("[error]") {
        return None;
    }
    let announces = lower.contains("created") || lower.contains("updated");
    if !announces {
        return None;
    }
    if lower.contains("3d model") {
        Some(ConversionStage::Model)
    } else if lower.contains("footprint") {
        Some(ConversionStage::Footprint)
    } else if lower.contains("symbol") {
        Some(ConversionStage::Symbol)
    } else {
        None
    }
}

fn stage_percent(stage: ConversionStage) -> i64 {
    match stage {
        ConversionStage::Symbol => SYMBOL_PERCENT,
        ConversionStage::Footprint => FOOTPRINT_PERCENT,
        ConversionStage::Model => MODEL_PERCENT,
        _ => FETCHING_PERCENT,
    }
}

/// Strip a leading `[LEVEL]` tag and surrounding whitespace.
fn strip_level(line: &str) -> &str {
    let trimmed = line.trim();
    match trimmed.strip_prefix('[').and_then(|rest| rest.split_once(']')) {
        Some((_, message)) => message.trim(),
        None => trimmed,
    }
}

#[derive(Debug, Default)]
struct Transcript {
    messages: Vec<String>,
    stderr_tail: VecDeque<String>,
}

impl Transcript {
    fn observe(&mut self, stream: Stream, line: &str, progress: &ProgressSink) {
        if line.trim().is_empty() {
            return;
        }
        tracing::debug!(?stream, line, "Converter output");

        if stream == Stream::Stderr {
            if self.stderr_tail.len() == STDERR_TAIL_LINES {
                self.stderr_tail.pop_front();
            }
            self.stderr_tail.push_back(line.trim().to_string());
        }

        if line.contains("[INFO]") || line.contains("[WARNING]") {
            self.messages.push(strip_level(line).to_string());
        }

        if let Some(stage) = classify_line(line) {
            progress.report(stage, stage_percent(stage), strip_level(line));
        }
    }

    fn failure_detail(&self) -> String {
        if self.stderr_tail.is_empty() {
            "no diagnostic output".to_string()
        } else {
            self.stderr_tail
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
