//! Job identifiers, per-job output directories, and reading files back out
//! of them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use tracing::{debug, warn};

const SUFFIX_LEN: usize = 6;

/// Extensions the file route will serve.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".java",
    ".kt",
    ".xml",
    ".json",
    ".txt",
    ".properties",
    ".gradle",
    ".pro",
    ".cfg",
    ".md",
    ".html",
    ".css",
    ".js",
    ".c",
    ".h",
    ".cpp",
    ".hpp",
];

static JOB_ID_RE: OnceLock<Regex> = OnceLock::new();

fn job_id_re() -> &'static Regex {
    JOB_ID_RE.get_or_init(|| Regex::new(r"^(jadx|ghidra)-\d+-[a-z0-9]+$").expect("valid literal regex"))
}

/// `<tool>-<unix millis>-<6 lowercase base36 chars>`.
pub fn new_job_id(tool: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("{tool}-{millis}-{suffix}")
}

pub fn is_valid_job_id(id: &str) -> bool {
    job_id_re().is_match(id)
}

/// An output directory owned by one decompile/analyze job.
///
/// The directory is removed when the job is dropped, unless [`Job::keep`]
/// was called. Failed runs and requests whose client went away therefore
/// leave nothing behind.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub dir: PathBuf,
    kept: bool,
}

impl Job {
    /// Allocate an id and create `<output_root>/<id>`.
    pub fn create(output_root: &Path, tool: &str) -> io::Result<Self> {
        let id = new_job_id(tool);
        let dir = output_root.join(&id);
        fs::create_dir_all(&dir)?;
        debug!(job_id = %id, dir = %dir.display(), "job directory created");
        Ok(Job {
            id,
            dir,
            kept: false,
        })
    }

    /// Keep the output on disk and hand back the job id.
    pub fn keep(mut self) -> String {
        self.kept = true;
        std::mem::take(&mut self.id)
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(job_id = %self.id, "job directory removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %self.id, "failed to remove job directory: {e}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("Invalid jobId format")]
    InvalidJobId,

    #[error("Invalid file path")]
    InvalidPath,

    #[error("File type not supported. Allowed: {}", ALLOWED_EXTENSIONS.join(", "))]
    UnsupportedType,

    #[error("File not found")]
    NotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("Failed to read file: {0}")]
    Io(#[from] io::Error),
}

/// Read `rel_path` from the output of job `job_id`, looking under
/// `sources/` first and then at the job root.
pub fn read_job_file(
    output_root: &Path,
    job_id: &str,
    rel_path: &str,
) -> Result<String, JobFileError> {
    if !is_valid_job_id(job_id) {
        return Err(JobFileError::InvalidJobId);
    }
    if rel_path.contains("..") || rel_path.starts_with('/') || Path::new(rel_path).is_absolute() {
        return Err(JobFileError::InvalidPath);
    }
    if !has_allowed_extension(rel_path) {
        return Err(JobFileError::UnsupportedType);
    }

    let job_dir = output_root.join(job_id);
    let target = [job_dir.join("sources").join(rel_path), job_dir.join(rel_path)]
        .into_iter()
        .find(|p| p.is_file())
        .ok_or(JobFileError::NotFound)?;

    // Symlinks inside the output could still point elsewhere.
    let root = output_root.canonicalize()?;
    if !target.canonicalize()?.starts_with(&root) {
        return Err(JobFileError::AccessDenied);
    }

    Ok(fs::read_to_string(&target)?)
}

fn has_allowed_extension(path: &str) -> bool {
    path.rfind('.')
        .map(|i| path[i..].to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}
