use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "crucible",
    about = "Crucible — compile source to wasm and run it, content-addressed",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database path (defaults to in-memory state)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Root directory for compile scratch dirs
    #[arg(long, global = true)]
    pub scratch: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Compile a source file and store the module
    Compile(CompileArgs),
    /// Run a stored module against an input
    Run(RunArgs),
    /// Validate a wasm file against the execution contract
    Validate(ValidateArgs),
    /// Manage aliases
    Alias(AliasArgs),
    /// Show recent events
    Events(EventsArgs),
    /// List supported languages
    Languages,
    /// Show store statistics
    Stats,
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:7447")]
    pub bind: String,
}

#[derive(Args)]
pub struct CompileArgs {
    /// Language name from the registry
    pub language: String,
    /// Source file
    pub file: PathBuf,
    /// Write the module here as well as storing it
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Module ref: alias name or blob hash
    pub reference: String,
    /// Input file (empty input when omitted)
    pub input: Option<PathBuf>,
    /// Write the output here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Wasm file
    pub file: PathBuf,
}

#[derive(Args)]
pub struct AliasArgs {
    #[command(subcommand)]
    pub action: AliasAction,
}

#[derive(Subcommand)]
pub enum AliasAction {
    /// Point a name at a stored blob hash
    Set { name: String, hash: String },
    /// Show an alias
    Get { name: String },
    /// Remove an alias
    Delete { name: String },
    /// List all aliases
    List,
}

#[derive(Args)]
pub struct EventsArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["crucible", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, "0.0.0.0:8080");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_compile() {
        let cli =
            Cli::try_parse_from(["crucible", "compile", "zig", "main.zig", "-o", "m.wasm"])
                .unwrap();
        if let Command::Compile(args) = cli.command {
            assert_eq!(args.language, "zig");
            assert_eq!(args.file, PathBuf::from("main.zig"));
            assert_eq!(args.out, Some(PathBuf::from("m.wasm")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_run_with_input() {
        let cli = Cli::try_parse_from(["crucible", "run", "echo", "input.bin"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.reference, "echo");
            assert_eq!(args.input, Some(PathBuf::from("input.bin")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_alias_set() {
        let cli = Cli::try_parse_from(["crucible", "alias", "set", "m", "abc123"]).unwrap();
        if let Command::Alias(args) = cli.command {
            assert!(matches!(args.action, AliasAction::Set { .. }));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_events_limit() {
        let cli = Cli::try_parse_from(["crucible", "events", "-n", "5"]).unwrap();
        if let Command::Events(args) = cli.command {
            assert_eq!(args.limit, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_db_flag() {
        let cli =
            Cli::try_parse_from(["crucible", "--db", "/tmp/c.db", "languages"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/c.db")));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["crucible", "--format", "json", "stats"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
