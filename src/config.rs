use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{GlobalArgs, ServeArgs};
use crate::error::ConfigError;

// Precedence: CLI > env > file > defaults.

const DEFAULT_JADX_ROOT: &str = "/opt/jadx";
const DEFAULT_GHIDRA_ROOT: &str = "/opt/ghidra";
const DEFAULT_INTERCEPTOR_ROOT: &str = "/opt/interceptor-toolkit";
const DEFAULT_INTERCEPTOR_PYTHON: &str = "python3";
const DEFAULT_LLM_CMD: &str = "claude";
const DEFAULT_BIND: &str = "127.0.0.1:3000";

const DEFAULT_JADX_TIMEOUT_SEC: u64 = 300;
const DEFAULT_GHIDRA_TIMEOUT_SEC: u64 = 600;
const DEFAULT_INTERCEPTOR_TIMEOUT_SEC: u64 = 120;
const DEFAULT_LLM_TIMEOUT_SEC: u64 = 120;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Executable locations relative to their installation roots.
const JADX_BIN_SUBPATH: &str = "build/jadx/bin/jadx";
const GHIDRA_HEADLESS_SUBPATH: &str = "support/analyzeHeadless";
const INTERCEPTOR_SCRIPT_NAME: &str = "cli.py";

const ENV_PREFIX: &str = "TOOLGATE_";

/// Resolved configuration.
///
/// Built from three layers with precedence CLI > env > file > defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolgateConfig {
    pub jadx_root: PathBuf,
    pub jadx_bin: PathBuf,
    pub jadx_timeout_sec: u64,
    pub ghidra_root: PathBuf,
    pub ghidra_headless: PathBuf,
    pub ghidra_timeout_sec: u64,
    pub interceptor_root: PathBuf,
    pub interceptor_script: PathBuf,
    /// Interpreter the interceptor CLI script runs under.
    pub interceptor_python: String,
    pub interceptor_timeout_sec: u64,
    pub llm_cmd: String,
    pub llm_timeout_sec: u64,
    /// Job output lives in `<work_dir>/output/<jobId>`.
    pub work_dir: PathBuf,
    pub bind: String,
    pub workers: usize,
    pub queue_depth: usize,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// TOML-deserializable config file representation. All fields optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    jadx_root: Option<PathBuf>,
    jadx_bin: Option<PathBuf>,
    jadx_timeout_sec: Option<u64>,
    ghidra_root: Option<PathBuf>,
    ghidra_headless: Option<PathBuf>,
    ghidra_timeout_sec: Option<u64>,
    interceptor_root: Option<PathBuf>,
    interceptor_script: Option<PathBuf>,
    interceptor_python: Option<String>,
    interceptor_timeout_sec: Option<u64>,
    llm_cmd: Option<String>,
    llm_timeout_sec: Option<u64>,
    work_dir: Option<PathBuf>,
    bind: Option<String>,
    workers: Option<usize>,
    queue_depth: Option<usize>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

/// Intermediate layer where every field is optional, used to merge sources.
#[derive(Debug, Default)]
struct ConfigLayer {
    jadx_root: Option<PathBuf>,
    jadx_bin: Option<PathBuf>,
    jadx_timeout_sec: Option<u64>,
    ghidra_root: Option<PathBuf>,
    ghidra_headless: Option<PathBuf>,
    ghidra_timeout_sec: Option<u64>,
    interceptor_root: Option<PathBuf>,
    interceptor_script: Option<PathBuf>,
    interceptor_python: Option<String>,
    interceptor_timeout_sec: Option<u64>,
    llm_cmd: Option<String>,
    llm_timeout_sec: Option<u64>,
    work_dir: Option<PathBuf>,
    bind: Option<String>,
    workers: Option<usize>,
    queue_depth: Option<usize>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
}

impl From<FileConfig> for ConfigLayer {
    fn from(fc: FileConfig) -> Self {
        ConfigLayer {
            jadx_root: fc.jadx_root,
            jadx_bin: fc.jadx_bin,
            jadx_timeout_sec: fc.jadx_timeout_sec,
            ghidra_root: fc.ghidra_root,
            ghidra_headless: fc.ghidra_headless,
            ghidra_timeout_sec: fc.ghidra_timeout_sec,
            interceptor_root: fc.interceptor_root,
            interceptor_script: fc.interceptor_script,
            interceptor_python: fc.interceptor_python,
            interceptor_timeout_sec: fc.interceptor_timeout_sec,
            llm_cmd: fc.llm_cmd,
            llm_timeout_sec: fc.llm_timeout_sec,
            work_dir: fc.work_dir,
            bind: fc.bind,
            workers: fc.workers,
            queue_depth: fc.queue_depth,
            log_level: fc.log_level,
            log_file: fc.log_file,
        }
    }
}

impl ToolgateConfig {
    /// Load configuration with precedence: CLI > env > file > defaults.
    ///
    /// `serve` is only present for the `serve` subcommand.
    pub fn load(global: &GlobalArgs, serve: Option<&ServeArgs>) -> anyhow::Result<Self> {
        Self::load_with_env(global, serve, real_env_var)
    }

    /// Reject values that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroValue { field: "workers" });
        }
        for (field, value) in [
            ("jadx_timeout_sec", self.jadx_timeout_sec),
            ("ghidra_timeout_sec", self.ghidra_timeout_sec),
            ("interceptor_timeout_sec", self.interceptor_timeout_sec),
            ("llm_timeout_sec", self.llm_timeout_sec),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidBind {
                value: self.bind.clone(),
                detail: e.to_string(),
            })
    }

    /// Directory holding one subdirectory per decompile/analyze job.
    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join("output")
    }

    /// Internal constructor that accepts an env-var lookup function,
    /// enabling deterministic testing without process-global mutation.
    fn load_with_env(
        global: &GlobalArgs,
        serve: Option<&ServeArgs>,
        env_fn: fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let file_layer = match global.config.as_deref() {
            Some(path) => load_file_layer(path)?,
            None => ConfigLayer::default(),
        };
        let env_layer = load_env_layer(env_fn)?;
        let cli_layer = cli_layer_from(global, serve);

        let merged = merge_layers(file_layer, env_layer, cli_layer);

        let jadx_root = merged
            .jadx_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JADX_ROOT));
        let ghidra_root = merged
            .ghidra_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_GHIDRA_ROOT));
        let interceptor_root = merged
            .interceptor_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERCEPTOR_ROOT));

        Ok(ToolgateConfig {
            jadx_bin: merged
                .jadx_bin
                .unwrap_or_else(|| jadx_root.join(JADX_BIN_SUBPATH)),
            jadx_root,
            jadx_timeout_sec: merged.jadx_timeout_sec.unwrap_or(DEFAULT_JADX_TIMEOUT_SEC),
            ghidra_headless: merged
                .ghidra_headless
                .unwrap_or_else(|| ghidra_root.join(GHIDRA_HEADLESS_SUBPATH)),
            ghidra_root,
            ghidra_timeout_sec: merged
                .ghidra_timeout_sec
                .unwrap_or(DEFAULT_GHIDRA_TIMEOUT_SEC),
            interceptor_script: merged
                .interceptor_script
                .unwrap_or_else(|| interceptor_root.join(INTERCEPTOR_SCRIPT_NAME)),
            interceptor_root,
            interceptor_python: merged
                .interceptor_python
                .unwrap_or_else(|| DEFAULT_INTERCEPTOR_PYTHON.to_owned()),
            interceptor_timeout_sec: merged
                .interceptor_timeout_sec
                .unwrap_or(DEFAULT_INTERCEPTOR_TIMEOUT_SEC),
            llm_cmd: merged
                .llm_cmd
                .unwrap_or_else(|| DEFAULT_LLM_CMD.to_owned()),
            llm_timeout_sec: merged.llm_timeout_sec.unwrap_or(DEFAULT_LLM_TIMEOUT_SEC),
            work_dir: merged
                .work_dir
                .unwrap_or_else(|| env::temp_dir().join("toolgate")),
            bind: merged.bind.unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            workers: merged.workers.unwrap_or(DEFAULT_WORKERS),
            queue_depth: merged.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH),
            log_level: merged.log_level,
            log_file: merged.log_file,
        })
    }
}

fn load_file_layer(path: &Path) -> anyhow::Result<ConfigLayer> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
    let fc: FileConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;
    Ok(fc.into())
}

fn real_env_var(suffix: &str) -> Option<String> {
    let key = format!("{ENV_PREFIX}{suffix}");
    env::var(&key).ok().filter(|v| !v.is_empty())
}

fn load_env_layer(env_fn: fn(&str) -> Option<String>) -> Result<ConfigLayer, ConfigError> {
    Ok(ConfigLayer {
        jadx_root: env_fn("JADX_ROOT").map(PathBuf::from),
        jadx_bin: env_fn("JADX_BIN").map(PathBuf::from),
        jadx_timeout_sec: parse_env(env_fn, "JADX_TIMEOUT_SEC")?,
        ghidra_root: env_fn("GHIDRA_ROOT").map(PathBuf::from),
        ghidra_headless: env_fn("GHIDRA_HEADLESS").map(PathBuf::from),
        ghidra_timeout_sec: parse_env(env_fn, "GHIDRA_TIMEOUT_SEC")?,
        interceptor_root: env_fn("INTERCEPTOR_ROOT").map(PathBuf::from),
        interceptor_script: env_fn("INTERCEPTOR_SCRIPT").map(PathBuf::from),
        interceptor_python: env_fn("INTERCEPTOR_PYTHON"),
        interceptor_timeout_sec: parse_env(env_fn, "INTERCEPTOR_TIMEOUT_SEC")?,
        llm_cmd: env_fn("LLM_CMD"),
        llm_timeout_sec: parse_env(env_fn, "LLM_TIMEOUT_SEC")?,
        work_dir: env_fn("WORK_DIR").map(PathBuf::from),
        bind: env_fn("BIND"),
        workers: parse_env(env_fn, "WORKERS")?,
        queue_depth: parse_env(env_fn, "QUEUE_DEPTH")?,
        log_level: env_fn("LOG_LEVEL"),
        log_file: env_fn("LOG_FILE").map(PathBuf::from),
    })
}

fn parse_env<T>(env_fn: fn(&str) -> Option<String>, suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_fn(suffix) {
        Some(s) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::EnvParse {
                var: format!("{ENV_PREFIX}{suffix}"),
                detail: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn cli_layer_from(global: &GlobalArgs, serve: Option<&ServeArgs>) -> ConfigLayer {
    ConfigLayer {
        llm_cmd: global.llm_cmd.clone(),
        work_dir: global.work_dir.clone(),
        log_level: global.log_level.clone(),
        log_file: global.log_file.clone(),
        bind: serve.and_then(|s| s.bind.clone()),
        workers: serve.and_then(|s| s.workers),
        queue_depth: serve.and_then(|s| s.queue_depth),
        ..ConfigLayer::default()
    }
}

/// Merge three layers. For each field, pick CLI first, then env, then file.
fn merge_layers(file: ConfigLayer, env: ConfigLayer, cli: ConfigLayer) -> ConfigLayer {
    ConfigLayer {
        jadx_root: cli.jadx_root.or(env.jadx_root).or(file.jadx_root),
        jadx_bin: cli.jadx_bin.or(env.jadx_bin).or(file.jadx_bin),
        jadx_timeout_sec: cli
            .jadx_timeout_sec
            .or(env.jadx_timeout_sec)
            .or(file.jadx_timeout_sec),
        ghidra_root: cli.ghidra_root.or(env.ghidra_root).or(file.ghidra_root),
        ghidra_headless: cli
            .ghidra_headless
            .or(env.ghidra_headless)
            .or(file.ghidra_headless),
        ghidra_timeout_sec: cli
            .ghidra_timeout_sec
            .or(env.ghidra_timeout_sec)
            .or(file.ghidra_timeout_sec),
        interceptor_root: cli
            .interceptor_root
            .or(env.interceptor_root)
            .or(file.interceptor_root),
        interceptor_script: cli
            .interceptor_script
            .or(env.interceptor_script)
            .or(file.interceptor_script),
        interceptor_python: cli
            .interceptor_python
            .or(env.interceptor_python)
            .or(file.interceptor_python),
        interceptor_timeout_sec: cli
            .interceptor_timeout_sec
            .or(env.interceptor_timeout_sec)
            .or(file.interceptor_timeout_sec),
        llm_cmd: cli.llm_cmd.or(env.llm_cmd).or(file.llm_cmd),
        llm_timeout_sec: cli
            .llm_timeout_sec
            .or(env.llm_timeout_sec)
            .or(file.llm_timeout_sec),
        work_dir: cli.work_dir.or(env.work_dir).or(file.work_dir),
        bind: cli.bind.or(env.bind).or(file.bind),
        workers: cli.workers.or(env.workers).or(file.workers),
        queue_depth: cli.queue_depth.or(env.queue_depth).or(file.queue_depth),
        log_level: cli.log_level.or(env.log_level).or(file.log_level),
        log_file: cli.log_file.or(env.log_file).or(file.log_file),
    }
}
