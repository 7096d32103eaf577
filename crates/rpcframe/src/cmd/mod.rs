use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use rpcframe_protocol::config::DEFAULT_CHUNK_SIZE;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod dump;
pub mod sample;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a request or response and write the raw message bytes.
    Sample(SampleArgs),
    /// Decode a captured message and print its contents.
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Sample(args) => sample::run(args),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Method name of the request.
    #[arg(required_unless_present = "response")]
    pub method: Option<String>,
    /// Request argument as NAME=VALUE. VALUE is read as JSON, or as a plain string.
    #[arg(long = "arg", value_name = "NAME=VALUE")]
    pub args: Vec<String>,
    /// Request tag as KEY=VALUE.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,
    /// Encode a response instead of a request.
    #[arg(long, conflicts_with_all = ["args", "tags"])]
    pub response: bool,
    /// Result value of the response, read like an argument value.
    #[arg(long, requires = "response", conflicts_with = "error")]
    pub result: Option<String>,
    /// Encode an invalid response carrying this error message.
    #[arg(long, requires = "response")]
    pub error: Option<String>,
    /// Write the message to a file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DumpMode {
    /// The flat MessagePack value sequence.
    #[default]
    Values,
    /// A request with its arguments.
    Request,
    /// A response with its result or error.
    Response,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Message file to decode, or `-` for stdin.
    pub input: PathBuf,
    #[arg(long, value_enum, default_value_t = DumpMode::Values)]
    pub mode: DumpMode,
    /// Bytes fed to the decoder per step.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Declare a model type name.
    #[arg(long = "model", value_name = "NAME")]
    pub models: Vec<String>,
    /// Declare an enum type as NAME=VARIANT,VARIANT,...
    #[arg(long = "enum", value_name = "NAME=VARIANTS")]
    pub enums: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Split `NAME=VALUE`. The name must be non-empty; the value may be.
pub fn split_pair<'a>(flag: &str, input: &'a str) -> CliResult<(&'a str, &'a str)> {
    match input.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => Err(crate::exit::CliError::new(
            crate::exit::USAGE,
            format!("{flag} expects NAME=VALUE, got {input:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_pair_keeps_later_equals_in_value() {
        assert_eq!(split_pair("--arg", "q=a=b").unwrap(), ("q", "a=b"));
        assert_eq!(split_pair("--arg", "empty=").unwrap(), ("empty", ""));
    }

    #[test]
    fn split_pair_rejects_missing_name() {
        let err = split_pair("--tag", "=x").unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
        assert!(split_pair("--tag", "novalue").is_err());
    }
}
