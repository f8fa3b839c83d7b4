use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use toolgate::cli::{AnalyzeArgs, Cli, Commands, DecompileArgs, OpenApiArgs, ScanArgs};
use toolgate::config::ToolgateConfig;
use toolgate::error::ToolError;
use toolgate::tools::Toolset;
use toolgate::tools::ghidra::{self, AnalyzeOptions};
use toolgate::tools::interceptor::{ScanOptions, Severity, SpecFormat, parse_categories};
use toolgate::tools::jadx::DecompileOptions;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            if let Some(hint) = e.downcast_ref::<ToolError>().and_then(ToolError::hint) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let serve_args = match &cli.command {
        Commands::Serve(args) => Some(args),
        _ => None,
    };
    let config = ToolgateConfig::load(&cli.global, serve_args)?;

    toolgate::logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

    config.validate()?;

    info!(
        jadx_root = %config.jadx_root.display(),
        ghidra_root = %config.ghidra_root.display(),
        interceptor_root = %config.interceptor_root.display(),
        llm_cmd = %config.llm_cmd,
        work_dir = %config.work_dir.display(),
        "config loaded"
    );

    let tools = Toolset::from_config(&config);

    match cli.command {
        Commands::Serve(_) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("start async runtime")?;
            runtime.block_on(toolgate::http::serve(&config))
        }
        Commands::Check => print_json(&tools.report()),
        Commands::Decompile(args) => {
            let output = tools.jadx.decompile(&args.input, &decompile_options(&args))?;
            println!("{output}");
            Ok(())
        }
        Commands::Analyze(args) => {
            println!("{}", analyze(&tools, &args)?);
            Ok(())
        }
        Commands::Scan(args) => {
            let opts = scan_options(&args)?;
            print_json(&tools.interceptor.scan(&args.session, &opts)?)
        }
        Commands::Openapi(args) => {
            let (format, include_examples) = openapi_options(&args)?;
            match tools.interceptor.openapi(&args.session, format, include_examples)? {
                Value::String(text) => {
                    println!("{text}");
                    Ok(())
                }
                spec => print_json(&spec),
            }
        }
        Commands::Beautify(args) => {
            println!("{}", tools.llm.beautify(&read_code(&args.file)?)?);
            Ok(())
        }
        Commands::Explain(args) => {
            println!("{}", tools.llm.explain(&read_code(&args.file)?)?);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_code(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn decompile_options(args: &DecompileArgs) -> DecompileOptions {
    DecompileOptions {
        output_dir: args.output_dir.clone(),
        show_bad_code: args.show_bad_code,
        no_res: args.no_res,
        no_src: args.no_src,
        export_gradle: args.export_gradle,
        deobf: args.deobf,
        deobf_min: args.deobf_min,
        deobf_max: args.deobf_max,
        threads_count: args.threads,
    }
}

fn analyze(tools: &Toolset, args: &AnalyzeArgs) -> Result<String, ToolError> {
    if args.export_decompiled {
        return tools.ghidra.export_decompiled_code(
            &args.input,
            &args.project_dir,
            args.script_path.as_deref(),
            args.max_cpu,
        );
    }
    let opts = AnalyzeOptions {
        project_dir: args.project_dir.clone(),
        project_name: args
            .project_name
            .clone()
            .unwrap_or_else(|| ghidra::NATIVE_PROJECT_NAME.to_owned()),
        script_path: args.script_path.clone(),
        max_cpu: args.max_cpu,
        ..Default::default()
    };
    tools.ghidra.analyze(&args.input, &opts)
}

fn scan_options(args: &ScanArgs) -> Result<ScanOptions, ToolError> {
    Ok(ScanOptions {
        severity: args
            .severity
            .as_deref()
            .map(str::parse::<Severity>)
            .transpose()?,
        categories: match args.category.as_deref() {
            Some(list) => parse_categories(list)?,
            None => Vec::new(),
        },
    })
}

fn openapi_options(args: &OpenApiArgs) -> Result<(SpecFormat, bool), ToolError> {
    let format = match args.format.as_deref() {
        Some(f) => f.parse::<SpecFormat>()?,
        None => SpecFormat::default(),
    };
    Ok((format, args.include_examples))
}
