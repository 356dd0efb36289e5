//! Converter implementations that run outside the process.
//!
//! [`CliConverter`] drives the `easyeda2kicad` command-line tool. The
//! argument list and the expected artifact layout live in [`command`] so
//! they can be tested without spawning anything.

pub mod cli;
pub mod command;

pub use cli::CliConverter;
pub use command::{build_converter_args, expected_artifacts};
