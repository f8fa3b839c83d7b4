use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// toolgate — run reverse-engineering and LLM command-line tools behind a
/// managed process runner and serve their results as JSON.
#[derive(Debug, Parser)]
#[command(name = "toolgate", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
///
/// Everything here can also be set via config file or `TOOLGATE_*` env
/// vars. Precedence: CLI > env > file > defaults.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct GlobalArgs {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (default: "info"). Supports tracing directives
    /// (e.g. "debug", "toolgate=trace,warn"). Overridden by TOOLGATE_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to a log file. When set, structured JSON logs are appended here
    /// in addition to the human-readable stderr output.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Directory for job output and scratch space.
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// LLM CLI binary name or path (default: "claude").
    #[arg(long, global = true)]
    pub llm_cmd: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the HTTP API.
    Serve(ServeArgs),

    /// Report which external tools are installed.
    Check,

    /// Decompile an APK/DEX/AAR with JADX.
    Decompile(DecompileArgs),

    /// Import and analyze a binary with Ghidra headless.
    Analyze(AnalyzeArgs),

    /// Run an interceptor security scan on a capture session.
    Scan(ScanArgs),

    /// Generate an OpenAPI spec from a capture session.
    Openapi(OpenApiArgs),

    /// Beautify obfuscated JavaScript with the LLM CLI.
    Beautify(CodeArgs),

    /// Explain a piece of code with the LLM CLI.
    Explain(CodeArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Address to listen on (default: "127.0.0.1:3000").
    #[arg(long)]
    pub bind: Option<String>,

    /// Number of tool invocations that may run at once (default: 4).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Invocations allowed to wait for a worker before requests are
    /// rejected with 503 (default: 16).
    #[arg(long)]
    pub queue_depth: Option<usize>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct DecompileArgs {
    /// APK, DEX or AAR file.
    pub input: PathBuf,

    /// Directory JADX writes sources and resources into.
    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub show_bad_code: bool,

    #[arg(long)]
    pub no_res: bool,

    #[arg(long)]
    pub no_src: bool,

    #[arg(long)]
    pub export_gradle: bool,

    #[arg(long)]
    pub deobf: bool,

    #[arg(long)]
    pub deobf_min: Option<u32>,

    #[arg(long)]
    pub deobf_max: Option<u32>,

    /// Decompilation thread count.
    #[arg(short = 'j', long)]
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct AnalyzeArgs {
    /// Binary to import (ELF, PE, DEX, ...).
    pub input: PathBuf,

    /// Directory for the Ghidra project.
    #[arg(long)]
    pub project_dir: PathBuf,

    /// Ghidra project name (default: "native_analysis").
    #[arg(long)]
    pub project_name: Option<String>,

    #[arg(long)]
    pub max_cpu: Option<u32>,

    /// Run the decompiled-function export script after analysis.
    #[arg(long)]
    pub export_decompiled: bool,

    /// Extra Ghidra script directory.
    #[arg(long)]
    pub script_path: Option<PathBuf>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ScanArgs {
    /// Session ID or "latest".
    #[arg(long)]
    pub session: String,

    /// Minimum severity: critical, high, medium, low, info.
    #[arg(long)]
    pub severity: Option<String>,

    /// Comma-separated categories: auth, exposure, api, transport.
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, clap::Args)]
pub struct OpenApiArgs {
    /// Session ID or "latest".
    #[arg(long)]
    pub session: String,

    /// Output format: json (default) or yaml.
    #[arg(long)]
    pub format: Option<String>,

    #[arg(long)]
    pub include_examples: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CodeArgs {
    /// File containing the code.
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "serve",
            "--bind",
            "0.0.0.0:8080",
            "--workers",
            "2",
            "--queue-depth",
            "8",
        ])
        .expect("should parse serve flags");

        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.bind.as_deref(), Some("0.0.0.0:8080"));
                assert_eq!(args.workers, Some(2));
                assert_eq!(args.queue_depth, Some(8));
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "check",
            "--config",
            "toolgate.toml",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after subcommand");

        assert!(matches!(cli.command, Commands::Check));
        assert_eq!(cli.global.config, Some(PathBuf::from("toolgate.toml")));
        assert_eq!(cli.global.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn decompile_parses_options() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "decompile",
            "app.apk",
            "--output-dir",
            "out",
            "--show-bad-code",
            "--deobf",
            "--deobf-min",
            "3",
            "-j",
            "4",
        ])
        .expect("should parse decompile");

        match cli.command {
            Commands::Decompile(args) => {
                assert_eq!(args.input, PathBuf::from("app.apk"));
                assert_eq!(args.output_dir, PathBuf::from("out"));
                assert!(args.show_bad_code);
                assert!(args.deobf);
                assert!(!args.no_res);
                assert_eq!(args.deobf_min, Some(3));
                assert_eq!(args.threads, Some(4));
            }
            other => panic!("expected Decompile, got {other:?}"),
        }
    }

    #[test]
    fn decompile_requires_output_dir() {
        let err = Cli::try_parse_from(["toolgate", "decompile", "app.apk"])
            .expect_err("--output-dir is required");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn scan_parses_filters() {
        let cli = Cli::try_parse_from([
            "toolgate",
            "scan",
            "--session",
            "latest",
            "--severity",
            "high",
            "--category",
            "auth,api",
        ])
        .expect("should parse scan");

        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.session, "latest");
                assert_eq!(args.severity.as_deref(), Some("high"));
                assert_eq!(args.category.as_deref(), Some("auth,api"));
            }
            other => panic!("expected Scan, got {other:?}"),
        }
    }

    #[test]
    fn no_subcommand_shows_error() {
        let err = Cli::try_parse_from(["toolgate"]).expect_err("should fail without subcommand");
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn unknown_subcommand_rejected() {
        let err = Cli::try_parse_from(["toolgate", "unknown"]).expect_err("should reject");
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }
}
