//! Directory traversal and per-file scanning.
//!
//! [`walk_files`] enumerates candidate files under a root, applying the
//! always-skipped directory list, hidden-path and extension filters, and
//! user exclude globs. [`scan_file`] reads one file into a [`FileRecord`]
//! plus its decoded text (absent for binary files).
//!
//! Hidden is judged relative to the walk root: a file is hidden when any
//! path component below the root starts with `.`.
//!
//! Everything here is blocking I/O; async callers wrap it in
//! `spawn_blocking`.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

use crate::chunk::truncate_chars;
use crate::error::{Error, Result};
use crate::models::FileRecord;

/// Directory names never descended into.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "node_modules",
    "bower_components",
    ".venv",
    "venv",
    "env",
    ".env",
    ".tox",
    ".nox",
    "target",
    "dist",
    "build",
    ".idea",
    ".vscode",
    "coverage",
    "htmlcov",
    ".coverage",
];

/// Share of control bytes above which a probe is considered binary.
const CONTROL_RATIO_LIMIT: f64 = 0.30;

/// Which files a walk yields.
#[derive(Debug, Clone, Default)]
pub struct WalkFilter {
    pub ignore_hidden: bool,
    /// Normalized extensions (`.py`); `None` admits every extension.
    pub extensions: Option<Vec<String>>,
    pub exclude_globs: Vec<String>,
}

/// A file found by [`walk_files`].
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_hidden: bool,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<WalkEntry>,
    /// Entries that could not be read, as `(path, message)`.
    pub errors: Vec<(String, String)>,
}

/// Recursively list files under `root` that pass `filter`, sorted by path.
///
/// Unreadable directory entries are reported in [`WalkOutcome::errors`]
/// instead of aborting the walk.
pub fn walk_files(root: &Path, filter: &WalkFilter) -> Result<WalkOutcome> {
    if !root.exists() {
        return Err(Error::NotFound(format!(
            "directory does not exist: {}",
            root.display()
        )));
    }

    let excludes = build_globset(&filter.exclude_globs)?;
    let mut outcome = WalkOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| keep_entry(e, root, filter, &excludes));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                outcome.errors.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if let Some(exts) = &filter.extensions {
            if !exts.contains(&extension_of(path)) {
                continue;
            }
        }

        outcome.files.push(WalkEntry {
            path: path.to_path_buf(),
            is_hidden: is_hidden(root, path),
        });
    }

    outcome.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(outcome)
}

fn keep_entry(entry: &DirEntry, root: &Path, filter: &WalkFilter, excludes: &GlobSet) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()) {
        return false;
    }
    if filter.ignore_hidden && name.starts_with('.') {
        return false;
    }
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    !excludes.is_match(relative)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("invalid exclude globs: {}", e)))
}

/// Canonical form of `path`, falling back to the absolute form when the
/// path no longer exists.
pub fn resolve_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// String prefix matching `root` itself and everything below it, but not
/// siblings that merely share a name prefix (`/a/b` vs `/a/bc`).
pub fn dir_prefix(root: &Path) -> String {
    let s = root.to_string_lossy();
    if s.ends_with(std::path::MAIN_SEPARATOR) {
        s.to_string()
    } else {
        format!("{}{}", s, std::path::MAIN_SEPARATOR)
    }
}

/// True when any component of `path` below `root` starts with `.`.
pub fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

/// Lower-cased extension with a leading dot, or empty.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Normalize a user-supplied extension (`"PY"`, `".py"`) to `".py"`.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.').to_lowercase();
    format!(".{}", trimmed)
}

/// Binary if `bytes[..probe]` holds a NUL, or more than 30% control bytes
/// other than tab, newline, carriage return, form feed and escape.
pub fn is_binary(bytes: &[u8], probe: usize) -> bool {
    let sample = &bytes[..bytes.len().min(probe)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let control = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b)) || b == 0x7f)
        .count();
    control as f64 / sample.len() as f64 > CONTROL_RATIO_LIMIT
}

/// Language tag for a normalized extension.
pub fn detect_language(extension: &str) -> Option<&'static str> {
    let lang = match extension {
        ".py" | ".pyi" => "python",
        ".js" | ".mjs" | ".cjs" | ".jsx" => "javascript",
        ".ts" | ".tsx" => "typescript",
        ".rs" => "rust",
        ".go" => "go",
        ".java" => "java",
        ".kt" | ".kts" => "kotlin",
        ".c" | ".h" => "c",
        ".cpp" | ".cc" | ".cxx" | ".hpp" | ".hh" => "cpp",
        ".cs" => "csharp",
        ".rb" => "ruby",
        ".php" => "php",
        ".swift" => "swift",
        ".scala" => "scala",
        ".lua" => "lua",
        ".sh" | ".bash" | ".zsh" => "shell",
        ".sql" => "sql",
        ".html" | ".htm" => "html",
        ".css" | ".scss" | ".sass" => "css",
        ".json" => "json",
        ".yaml" | ".yml" => "yaml",
        ".toml" => "toml",
        ".xml" => "xml",
        ".md" | ".markdown" => "markdown",
        ".rst" => "rst",
        ".txt" => "text",
        ".ini" | ".cfg" | ".conf" => "ini",
        _ => return None,
    };
    Some(lang)
}

/// Limits applied while reading a file.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub preview_chars: usize,
    pub max_file_size: u64,
    pub binary_probe_bytes: usize,
}

/// A file read from disk: its metadata record and, for text, its content.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub record: FileRecord,
    pub text: Option<String>,
}

/// Read `path`, hash its full content and build its [`FileRecord`].
///
/// Files above `max_file_size` are hashed as a stream and recorded as
/// binary without loading their content.
pub fn scan_file(path: &Path, is_hidden: bool, limits: &ScanLimits) -> Result<ScannedFile> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let modified_at = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let extension = extension_of(path);
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (content_hash, text) = if size > limits.max_file_size {
        (hash_stream(path)?, None)
    } else {
        let bytes = std::fs::read(path)?;
        let hash = hex::encode(Sha256::digest(&bytes));
        let text = if is_binary(&bytes, limits.binary_probe_bytes) {
            None
        } else {
            Some(String::from_utf8_lossy(&bytes).into_owned())
        };
        (hash, text)
    };

    let record = FileRecord {
        path: path.to_string_lossy().to_string(),
        filename,
        language: detect_language(&extension).map(str::to_string),
        extension,
        content_hash,
        size_bytes: size as i64,
        modified_at,
        indexed_at: chrono::Utc::now().timestamp(),
        preview: text
            .as_deref()
            .map(|t| truncate_chars(t, limits.preview_chars))
            .unwrap_or_default(),
        is_hidden,
        is_binary: text.is_none(),
        line_count: text.as_deref().map(|t| t.lines().count() as i64),
    };

    Ok(ScannedFile { record, text })
}

fn hash_stream(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
