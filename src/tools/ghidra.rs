//! Ghidra headless analyzer (`support/analyzeHeadless`).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use super::{ToolProfile, require_file};
use crate::availability::Availability;
use crate::classify::ExitMessagePolicy;
use crate::config::ToolgateConfig;
use crate::error::ToolError;
use crate::hints::HintRules;

pub const TOOL_NAME: &str = "Ghidra";

pub const NATIVE_PROJECT_NAME: &str = "native_analysis";
pub const EXPORT_PROJECT_NAME: &str = "decompile_export";
pub const EXPORT_SCRIPT: &str = "ExportDecompiledFunctions.java";

const INPUT_HINT: &str = "Provide a valid path to a binary file (ELF, PE, DEX, etc.)";

/// Options for one headless run. `import` defaults to the input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeOptions {
    pub project_dir: PathBuf,
    pub project_name: String,
    pub import: Option<PathBuf>,
    pub process: Option<String>,
    pub post_script: Option<String>,
    pub script_path: Option<PathBuf>,
    pub delete_project: bool,
    pub overwrite: bool,
    pub recursive: bool,
    pub read_only: bool,
    pub max_cpu: Option<u32>,
}

/// `<projectDir> <projectName> -import <file> [options...]`
pub fn analyze_args(input: &Path, opts: &AnalyzeOptions) -> Vec<OsString> {
    let import = opts.import.as_deref().unwrap_or(input);
    let mut args: Vec<OsString> = vec![
        opts.project_dir.clone().into(),
        opts.project_name.clone().into(),
        "-import".into(),
        import.into(),
    ];

    if let Some(process) = &opts.process {
        args.push("-process".into());
        args.push(process.into());
    }
    if let Some(script) = &opts.post_script {
        args.push("-postScript".into());
        args.push(script.into());
    }
    if let Some(path) = &opts.script_path {
        args.push("-scriptPath".into());
        args.push(path.into());
    }

    let switches = [
        (opts.delete_project, "-deleteProject"),
        (opts.overwrite, "-overwrite"),
        (opts.recursive, "-recursive"),
        (opts.read_only, "-readOnly"),
    ];
    args.extend(switches.into_iter().filter(|(on, _)| *on).map(|(_, s)| s.into()));

    if let Some(n) = opts.max_cpu {
        args.push("-max-cpu".into());
        args.push(n.to_string().into());
    }
    args
}

#[derive(Debug, Clone)]
pub struct Ghidra {
    profile: ToolProfile,
}

impl Ghidra {
    pub fn from_config(cfg: &ToolgateConfig) -> Self {
        let profile = ToolProfile {
            name: TOOL_NAME.to_owned(),
            root: cfg.ghidra_root.clone(),
            executable: cfg.ghidra_headless.clone(),
            interpreter: None,
            default_timeout: Duration::from_secs(cfg.ghidra_timeout_sec),
            timeout_hint: Some(
                "Large binaries may require more time - consider increasing timeout".to_owned(),
            ),
            install_hint: format!(
                "Download Ghidra from https://ghidra-sre.org/ and extract to {}",
                cfg.ghidra_root.display()
            ),
            build_hint: "Ensure Ghidra is properly extracted with support/analyzeHeadless script"
                .to_owned(),
            hints: HintRules::new()
                .code("ENOENT", "Ghidra analyzeHeadless script not found")
                .code(
                    "EACCES",
                    "Permission denied - check execute permissions on analyzeHeadless",
                )
                .contains(
                    "JAVA_HOME",
                    "Set JAVA_HOME to your JDK installation (JDK 17+ recommended)",
                ),
            exit_policy: ExitMessagePolicy::ErrorSubstring,
        };
        Ghidra { profile }
    }

    pub fn profile(&self) -> &ToolProfile {
        &self.profile
    }

    pub fn availability(&self) -> Availability {
        self.profile.availability()
    }

    pub fn analyze(&self, input: &Path, opts: &AnalyzeOptions) -> Result<String, ToolError> {
        require_file(input, INPUT_HINT)?;
        info!(
            input = %input.display(),
            project = %opts.project_name,
            post_script = opts.post_script.as_deref().unwrap_or(""),
            "starting headless analysis"
        );
        self.profile.invoke(analyze_args(input, opts), None)
    }

    /// Analyze a native library pulled out of an APK. The throwaway project
    /// is deleted afterwards.
    pub fn analyze_native_lib(
        &self,
        lib: &Path,
        output_dir: &Path,
        export_script: Option<&str>,
        max_cpu: Option<u32>,
    ) -> Result<String, ToolError> {
        let opts = AnalyzeOptions {
            project_dir: output_dir.to_path_buf(),
            project_name: NATIVE_PROJECT_NAME.to_owned(),
            import: Some(lib.to_path_buf()),
            post_script: export_script.map(str::to_owned),
            delete_project: true,
            max_cpu,
            ..Default::default()
        };
        self.analyze(lib, &opts)
    }

    /// Run the decompiled-function export script over `input`.
    pub fn export_decompiled_code(
        &self,
        input: &Path,
        output_dir: &Path,
        script_path: Option<&Path>,
        max_cpu: Option<u32>,
    ) -> Result<String, ToolError> {
        let opts = AnalyzeOptions {
            project_dir: output_dir.to_path_buf(),
            project_name: EXPORT_PROJECT_NAME.to_owned(),
            import: Some(input.to_path_buf()),
            post_script: Some(EXPORT_SCRIPT.to_owned()),
            script_path: script_path.map(Path::to_path_buf),
            delete_project: true,
            max_cpu,
            ..Default::default()
        };
        self.analyze(input, &opts)
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::config::tests::config_in;
    use crate::tools::testutil::write_script;
    use std::fs;

    fn installed(dir: &Path, body: &str) -> Ghidra {
        let cfg = config_in(dir);
        write_script(&cfg.ghidra_headless, body);
        Ghidra::from_config(&cfg)
    }

    #[test]
    fn native_lib_uses_throwaway_project() {
        let dir = tempfile::tempdir().unwrap();
        let ghidra = installed(dir.path(), "echo \"$@\"");
        let lib = dir.path().join("libnative.so");
        fs::write(&lib, "\x7fELF").unwrap();
        let out_dir = dir.path().join("out");

        let out = ghidra
            .analyze_native_lib(&lib, &out_dir, None, Some(4))
            .unwrap();
        assert_eq!(
            out,
            format!(
                "{} native_analysis -import {} -deleteProject -max-cpu 4",
                out_dir.display(),
                lib.display()
            )
        );
    }

    #[test]
    fn export_runs_post_script() {
        let dir = tempfile::tempdir().unwrap();
        let ghidra = installed(dir.path(), "echo \"$@\"");
        let bin = dir.path().join("a.out");
        fs::write(&bin, "bin").unwrap();

        let out = ghidra
            .export_decompiled_code(&bin, dir.path(), Some(Path::new("/scripts")), None)
            .unwrap();
        assert!(
            out.contains("decompile_export -import")
                && out.contains("-postScript ExportDecompiledFunctions.java -scriptPath /scripts -deleteProject"),
            "{out}"
        );
    }

    #[test]
    fn missing_root_reports_install_hint() {
        let dir = tempfile::tempdir().unwrap();
        let ghidra = Ghidra::from_config(&config_in(dir.path()));
        let bin = dir.path().join("a.out");
        fs::write(&bin, "bin").unwrap();

        let err = ghidra
            .analyze(&bin, &AnalyzeOptions::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::NotAvailable { .. }));
        assert!(err.hint().unwrap().starts_with("Download Ghidra"));
    }
}
