//! Locate commands given by name (searched on `PATH`) or by path.
//!
//! On Windows a name without an extension also matches `<name>.exe`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve `cmd` to an executable file, or `None` when nothing matches.
pub fn resolve_command(cmd: &str) -> Option<PathBuf> {
    resolve_in(cmd, std::env::var_os("PATH"))
}

fn resolve_in(cmd: &str, search_path: Option<OsString>) -> Option<PathBuf> {
    let cmd = cmd.trim();
    if cmd.is_empty() {
        return None;
    }

    let given = Path::new(cmd);
    if given.components().count() > 1 || given.is_absolute() {
        return with_exe_variant(given).into_iter().find(|p| is_executable(p));
    }

    let search_path = search_path?;
    std::env::split_paths(&search_path)
        .flat_map(|dir| with_exe_variant(&dir.join(cmd)))
        .find(|p| is_executable(p))
}

/// `path`, plus `path.exe` on Windows when it has no extension.
fn with_exe_variant(path: &Path) -> Vec<PathBuf> {
    let mut out = vec![path.to_path_buf()];
    if cfg!(windows) && path.extension().is_none() {
        out.push(path.with_extension("exe"));
    }
    out
}

/// Regular file, with an execute bit on Unix.
pub fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => has_exec_bit(&meta),
        _ => false,
    }
}

#[cfg(unix)]
fn has_exec_bit(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &fs::Metadata) -> bool {
    true
}
