//! JADX: APK/DEX/AAR to Java decompiler.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use super::{ToolProfile, require_file};
use crate::availability::Availability;
use crate::classify::ExitMessagePolicy;
use crate::config::ToolgateConfig;
use crate::error::ToolError;
use crate::hints::HintRules;
use crate::jobs;

pub const TOOL_NAME: &str = "JADX";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_CLASSES_TIMEOUT: Duration = Duration::from_secs(60);

const INPUT_HINT: &str = "Provide a valid path to an APK, DEX, or AAR file";

/// Flags for one decompilation. Only `output_dir` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompileOptions {
    pub output_dir: PathBuf,
    pub show_bad_code: bool,
    pub no_res: bool,
    pub no_src: bool,
    pub export_gradle: bool,
    pub deobf: bool,
    pub deobf_min: Option<u32>,
    pub deobf_max: Option<u32>,
    pub threads_count: Option<u32>,
}

/// `-d <out> [flags...] <input>`
pub fn decompile_args(input: &Path, opts: &DecompileOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-d".into(), opts.output_dir.clone().into()];
    let flags = [
        (opts.show_bad_code, "--show-bad-code"),
        (opts.no_res, "--no-res"),
        (opts.no_src, "--no-src"),
        (opts.export_gradle, "--export-gradle"),
        (opts.deobf, "--deobf"),
    ];
    args.extend(flags.into_iter().filter(|(on, _)| *on).map(|(_, f)| f.into()));

    let valued = [
        ("--deobf-min", opts.deobf_min),
        ("--deobf-max", opts.deobf_max),
        ("-j", opts.threads_count),
    ];
    for (flag, value) in valued {
        if let Some(n) = value {
            args.push(flag.into());
            args.push(n.to_string().into());
        }
    }

    args.push(input.into());
    args
}

#[derive(Debug, Clone)]
pub struct Jadx {
    profile: ToolProfile,
    scratch_root: PathBuf,
}

impl Jadx {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        let profile = ToolProfile {
            name: TOOL_NAME.to_owned(),
            root: cfg.jadx_root.clone(),
            executable: cfg.jadx_bin.clone(),
            interpreter: None,
            default_timeout: Duration::from_secs(cfg.jadx_timeout_sec),
            timeout_hint: Some(
                "Try reducing thread count or decompiling smaller sections".to_owned(),
            ),
            install_hint: format!(
                "Clone JADX: git clone https://github.com/skylot/jadx.git {}",
                cfg.jadx_root.display()
            ),
            build_hint: format!(
                "Build JADX: cd {} && ./gradlew dist (requires JDK 11+)",
                cfg.jadx_root.display()
            ),
            hints: HintRules::new()
                .code(
                    "ENOENT",
                    "JADX binary not found - ensure it's built with ./gradlew dist",
                )
                .code(
                    "EACCES",
                    "Permission denied - check execute permissions on JADX binary",
                ),
            exit_policy: ExitMessagePolicy::ErrorSubstring,
        };
        Jadx {
            profile,
            scratch_root: cfg.work_dir.join("scratch"),
        }
    }

    pub fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    pub fn availability(&self) -> Availability {
        self.profile.availability()
    }

    pub fn decompile(&self, input: &Path, opts: &DecompileOptions) -> Result<String, ToolError> {
        require_file(input, INPUT_HINT)?;
        info!(input = %input.display(), output_dir = %opts.output_dir.display(), "decompiling");
        self.profile.invoke(decompile_args(input, opts), None)
    }

    pub fn version(&self) -> Result<String, ToolError> {
        self.profile.invoke(["--version"], Some(VERSION_TIMEOUT))
    }

    /// Class listing without writing sources or resources. The scratch
    /// output directory is removed whatever the outcome.
    pub fn list_classes(&self, input: &Path) -> Result<String, ToolError> {
        require_file(input, INPUT_HINT)?;
        let scratch = self.scratch_root.join(jobs::new_job_id("jadx-list"));
        let args: Vec<OsString> = vec![
            "--no-src".into(),
            "--no-res".into(),
            "-d".into(),
            scratch.clone().into(),
            input.into(),
        ];

        let result = self.profile.invoke(args, Some(LIST_CLASSES_TIMEOUT));

        if let Err(e) = fs::remove_dir_all(&scratch) {
            debug!(dir = %scratch.display(), "scratch cleanup skipped: {e}");
        }
        result
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::config::tests::config_in;
    use crate::tools::testutil::write_script;

    fn installed(dir: &Path, body: &str) -> Jadx {
        let cfg = config_in(dir);
        write_script(&cfg.jadx_bin, body);
        Jadx::from_config(&cfg)
    }

    #[test]
    fn decompile_passes_argv_to_binary() {
        let dir = tempfile::tempdir().unwrap();
        let jadx = installed(dir.path(), "echo \"$@\"");
        let apk = dir.path().join("app.apk");
        fs::write(&apk, "PK").unwrap();

        let opts = DecompileOptions {
            output_dir: dir.path().join("out"),
            deobf: true,
            ..Default::default()
        };
        let out = jadx.decompile(&apk, &opts).unwrap();
        assert_eq!(
            out,
            format!("-d {} --deobf {}", opts.output_dir.display(), apk.display())
        );
    }

    #[test]
    fn decompile_missing_input_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let jadx = installed(dir.path(), &format!("touch {}", marker.display()));

        let err = jadx
            .decompile(&dir.path().join("missing.apk"), &DecompileOptions::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::Precondition { .. }));
        assert_eq!(err.hint(), Some(INPUT_HINT));
        assert!(!marker.exists());
    }

    #[test]
    fn version_returns_trimmed_output() {
        let dir = tempfile::tempdir().unwrap();
        let jadx = installed(dir.path(), "echo \"1.5.1\"; echo");
        assert_eq!(jadx.version().unwrap(), "1.5.1");
    }

    #[test]
    fn failure_message_comes_from_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let jadx = installed(
            dir.path(),
            "echo 'INFO loading' >&2; echo 'ERROR - Incorrect arguments' >&2; exit 1",
        );
        let err = jadx.version().unwrap_err();
        assert_eq!(
            err,
            ToolError::NonZeroExit {
                message: "ERROR - Incorrect arguments".to_owned(),
                exit_code: Some(1),
            }
        );
    }

    #[test]
    fn list_classes_removes_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        // Writes into the -d directory (4th argument), like JADX would.
        let jadx = installed(dir.path(), "mkdir -p \"$4\"; touch \"$4/classes.txt\"; echo listed");
        let apk = dir.path().join("app.apk");
        fs::write(&apk, "PK").unwrap();

        assert_eq!(jadx.list_classes(&apk).unwrap(), "listed");
        let scratch_root = dir.path().join("work/scratch");
        let leftovers = fs::read_dir(&scratch_root)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
