mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "rpcframe",
    version,
    about = "Encode and inspect header-code framed RPC messages"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "RPCFRAME_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sample_subcommand() {
        let cli = Cli::try_parse_from([
            "rpcframe", "sample", "add", "--arg", "a=3", "--arg", "b=4", "--tag", "trace=1",
        ])
        .expect("sample args should parse");

        match cli.command {
            Command::Sample(args) => {
                assert_eq!(args.method.as_deref(), Some("add"));
                assert_eq!(args.args, vec!["a=3", "b=4"]);
                assert_eq!(args.tags, vec!["trace=1"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sample_requires_method_for_requests() {
        let err = Cli::try_parse_from(["rpcframe", "sample"]).expect_err("method is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn rejects_result_with_error() {
        let err = Cli::try_parse_from([
            "rpcframe",
            "sample",
            "--response",
            "--result",
            "7",
            "--error",
            "boom",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_dump_subcommand() {
        let cli = Cli::try_parse_from([
            "rpcframe",
            "dump",
            "/tmp/msg.bin",
            "--mode",
            "request",
            "--enum",
            "Color=Red,Green",
            "--format",
            "pretty",
        ])
        .expect("dump args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert!(matches!(cli.command, Command::Dump(_)));
    }
}
