//! MAID command line
//!
//! ```text
//! maid validate [FILE] [--mode strict|permissive]
//! maid manifests FILE
//! maid test [--manifest NAME | --file FILE]
//! maid files [--status undeclared|registered|tracked]
//! maid snapshot FILE [--output-dir DIR] [--force]
//! maid snapshot-system [--output PATH] [--quiet]
//! maid schema
//! ```
//!
//! Global flags: `--root`, `--json`, `--verbose`, `--workers`, `--timeout`.
//! The process exit code is the [`maid_validate::ResultCode`] of the run.

#![warn(unreachable_pub)]

mod commands;
mod render;

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use maid_validate::{ResultCode, ValidationMode, ValidatorConfig};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "MAID_LOG";

/// Build the `maid` command
#[must_use]
pub fn command() -> Command {
    Command::new("maid")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Validate source files against their MAID manifest chains")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Project root; file arguments are relative to it"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging on stderr"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .global(true)
                .value_parser(value_parser!(usize))
                .help("Concurrent file validations (overrides maid.toml)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Overall sweep budget in seconds (overrides maid.toml)"),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate one file, or every referenced file")
                .arg(
                    Arg::new("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("File to validate; omit to sweep the project"),
                )
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(value_parser!(ValidationMode))
                        .help("strict or permissive; defaults to the file's classification"),
                ),
        )
        .subcommand(
            Command::new("manifests")
                .about("List the manifests referencing a file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("test")
                .about("Run validation commands of active manifests")
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .conflicts_with("file")
                        .help("Run a single manifest by name"),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Run the active manifests of one file"),
                )
                .arg(
                    Arg::new("command-timeout")
                        .long("command-timeout")
                        .value_parser(value_parser!(u64))
                        .help("Per-command budget in seconds (overrides maid.toml)"),
                ),
        )
        .subcommand(
            Command::new("files")
                .about("Show manifest coverage of the project tree")
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_parser(["undeclared", "registered", "tracked"])
                        .help("Only list files with this status"),
                ),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Generate a manifest from the current structure of a file")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory for the manifest; defaults to the manifest directory"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite an existing manifest file"),
                ),
        )
        .subcommand(
            Command::new("snapshot-system")
                .about("Merge the active declarations of every file into one manifest")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .default_value("system.manifest.json")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file relative to the root, or - for standard output"),
                )
                .arg(
                    Arg::new("quiet")
                        .long("quiet")
                        .short('q')
                        .action(ArgAction::SetTrue)
                        .help("Suppress the summary"),
                ),
        )
        .subcommand(Command::new("schema").about("Print the manifest JSON schema"))
}

/// Settings shared by every subcommand
#[derive(Debug, Clone)]
pub(crate) struct Context {
    pub(crate) root: PathBuf,
    pub(crate) config: ValidatorConfig,
    pub(crate) json: bool,
}

impl Context {
    fn from_matches(args: &ArgMatches) -> anyhow::Result<Self> {
        let root = args
            .get_one::<PathBuf>("root")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let root = root
            .canonicalize()
            .with_context(|| format!("project root {}", root.display()))?;

        let mut config = ValidatorConfig::discover(&root)?;
        if let Some(workers) = args.get_one::<usize>("workers") {
            config = config.with_workers(*workers);
        }
        if let Some(secs) = args.get_one::<u64>("timeout") {
            config = config.with_sweep_timeout(Some(Duration::from_secs(*secs)));
        }
        tracing::debug!("root {}, config {:?}", root.display(), config);

        Ok(Self {
            root,
            config,
            json: args.get_flag("json"),
        })
    }
}

/// Run the parsed command line, writing the report to `out`
///
/// # Errors
/// Infrastructure failures: unreadable project root or manifest directory,
/// invalid configuration, unknown files or manifests.
pub async fn run(matches: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<ResultCode> {
    let Some((name, args)) = matches.subcommand() else {
        anyhow::bail!("no subcommand given");
    };
    if name == "schema" {
        return commands::schema(out);
    }

    let ctx = Context::from_matches(args)?;
    match name {
        "validate" => commands::validate(&ctx, args, out).await,
        "manifests" => commands::manifests(&ctx, args, out),
        "test" => commands::test(&ctx, args, out).await,
        "files" => commands::files(&ctx, args, out),
        "snapshot" => commands::snapshot(&ctx, args, out),
        "snapshot-system" => commands::snapshot_system(&ctx, args, out),
        other => anyhow::bail!("unknown subcommand {other}"),
    }
}
