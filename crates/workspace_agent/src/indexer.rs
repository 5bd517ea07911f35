//! Bounded, read-only summary of the workspace tree.

use std::fmt::Write as _;
use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, warn};

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_MAX_FILES: usize = 50;
pub const DEFAULT_MAX_SUMMARY_CHARS: usize = 8_000;

pub const DEFAULT_DENYLIST: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
];

const EMPTY_WORKSPACE: &str = "No relevant files found in this directory.";

/// Scan bounds. Entries beyond them are counted and reported, never dropped silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLimits {
    pub max_depth: usize,
    pub max_files: usize,
    pub max_summary_chars: usize,
    pub denylist: Vec<String>,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
            max_summary_chars: DEFAULT_MAX_SUMMARY_CHARS,
            denylist: DEFAULT_DENYLIST.iter().map(|name| name.to_string()).collect(),
        }
    }
}

/// Result of one scan. `warning` is set when the root could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSummary {
    pub text: String,
    pub file_count: usize,
    pub truncated: bool,
    pub warning: Option<String>,
}

impl WorkspaceSummary {
    fn unreadable(root: &Path, reason: impl std::fmt::Display) -> Self {
        let warning = format!("Could not read workspace {}: {reason}", root.display());
        Self {
            text: String::new(),
            file_count: 0,
            truncated: false,
            warning: Some(warning),
        }
    }
}

struct Entry {
    path: String,
    size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceIndexer {
    limits: IndexLimits,
}

impl WorkspaceIndexer {
    pub fn new(limits: IndexLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &IndexLimits {
        &self.limits
    }

    /// Walks `root` in file-name order and renders the summary text.
    ///
    /// Never writes to the filesystem and never fails: an unreadable root
    /// yields an empty summary carrying a warning.
    pub fn scan(&self, root: &Path) -> WorkspaceSummary {
        if let Err(error) = std::fs::read_dir(root) {
            warn!(root = %root.display(), %error, "workspace root unreadable");
            return WorkspaceSummary::unreadable(root, error);
        }

        let entries = self.collect_entries(root);
        let summary = self.render(root, &entries);
        debug!(
            root = %root.display(),
            files = entries.len(),
            truncated = summary.truncated,
            "workspace scanned"
        );
        summary
    }

    fn collect_entries(&self, root: &Path) -> Vec<Entry> {
        let denylist = self.limits.denylist.clone();
        let walker = WalkBuilder::new(root)
            .max_depth(Some(self.limits.max_depth))
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .parents(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| denylist.iter().any(|denied| denied == name))
            })
            .build();

        let mut entries = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    debug!(%error, "skipping unreadable workspace entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            entries.push(Entry {
                path: display_path(relative),
                size,
            });
        }
        entries
    }

    fn render(&self, root: &Path, entries: &[Entry]) -> WorkspaceSummary {
        let mut text = format!("Current working directory: {}\n", root.display());
        if entries.is_empty() {
            text.push_str(EMPTY_WORKSPACE);
            return WorkspaceSummary {
                text,
                file_count: 0,
                truncated: false,
                warning: None,
            };
        }

        let mut lines = Vec::new();
        let mut used = text.len();
        for entry in entries.iter().take(self.limits.max_files) {
            let line = format!("- {} ({})", entry.path, format_size(entry.size));
            if used + line.len() + 1 > self.limits.max_summary_chars {
                break;
            }
            used += line.len() + 1;
            lines.push(line);
        }

        let shown = lines.len();
        let omitted = entries.len() - shown;
        let _ = writeln!(text, "Available files ({shown} shown):");
        text.push_str(&lines.join("\n"));
        if omitted > 0 {
            let _ = write!(text, "\n[truncated: {omitted} more entries omitted]");
        }

        WorkspaceSummary {
            text,
            file_count: entries.len(),
            truncated: omitted > 0,
            warning: None,
        }
    }
}

fn display_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    match bytes {
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{b} B"),
    }
}
