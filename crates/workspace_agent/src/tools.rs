//! Read-only file access for model tool calls.
//!
//! Every failure is a [`ToolError`], which the session turns into an error
//! [`ToolResult`] so the model can react to it. Nothing here writes to disk.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use model_transport::{ToolCallRequest, ToolDefinition, ToolResult};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub const READ_FILE_TOOL: &str = "read_file";

/// Files above this size are rejected outright.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
/// Content beyond this many bytes is cut and marked as truncated.
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 200 * 1024;
/// Leading bytes inspected for NUL when sniffing binary files.
pub const DEFAULT_BINARY_SNIFF_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    pub max_file_bytes: u64,
    pub max_content_bytes: usize,
    pub binary_sniff_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            binary_sniff_bytes: DEFAULT_BINARY_SNIFF_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("path must not be empty")]
    EmptyPath,
    #[error("path escapes the workspace root: {0}")]
    OutsideWorkspace(String),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("not a regular file: {0}")]
    NotAFile(String),
    #[error("file too large: {path} is {size} bytes (limit {limit} bytes)")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("binary file not supported: {0}")]
    Binary(String),
    #[error("could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// Successful read, possibly cut to the content limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

/// Definition advertised to the model for the single `read_file` tool.
pub fn read_file_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: READ_FILE_TOOL.to_string(),
        description: Some("Read the contents of a file in the workspace".to_string()),
        input_schema: json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file, relative to the current workspace directory"
                }
            },
            "required": ["file_path"]
        }),
    }
}

#[derive(Debug, Clone)]
pub struct FileAccessTool {
    workspace_root: PathBuf,
    limits: ReadLimits,
}

impl FileAccessTool {
    pub fn new(workspace_root: impl Into<PathBuf>, limits: ReadLimits) -> Self {
        let workspace_root = workspace_root.into();
        let workspace_root = workspace_root.canonicalize().unwrap_or(workspace_root);
        Self {
            workspace_root,
            limits,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn limits(&self) -> ReadLimits {
        self.limits
    }

    /// Answers one tool call with exactly one result.
    pub fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        match self.run(call) {
            Ok(file) => {
                debug!(
                    tool_call_id = %call.id,
                    path = %file.path,
                    bytes = file.content.len(),
                    truncated = file.truncated,
                    "read_file succeeded"
                );
                let output = json!({
                    "file_path": file.path,
                    "content": file.content,
                    "truncated": file.truncated,
                });
                ToolResult::success(&call.id, &call.tool_name, output.to_string())
            }
            Err(error) => {
                warn!(tool_call_id = %call.id, tool = %call.tool_name, %error, "tool call failed");
                let output = json!({ "error": error.to_string() });
                ToolResult::error(&call.id, &call.tool_name, output.to_string())
            }
        }
    }

    fn run(&self, call: &ToolCallRequest) -> Result<FileContent, ToolError> {
        if call.tool_name != READ_FILE_TOOL {
            return Err(ToolError::UnsupportedTool(call.tool_name.clone()));
        }
        let path = call
            .target_path()
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: call.tool_name.clone(),
                reason: "missing string argument `file_path`".to_string(),
            })?;
        self.read(path)
    }

    /// Reads `target_path`, resolved against the workspace root.
    pub fn read(&self, target_path: &str) -> Result<FileContent, ToolError> {
        let resolved = self.resolve(target_path)?;
        let metadata = fs::metadata(&resolved).map_err(|error| unreadable(target_path, error))?;
        if !metadata.is_file() {
            return Err(ToolError::NotAFile(target_path.to_string()));
        }
        if metadata.len() > self.limits.max_file_bytes {
            return Err(ToolError::TooLarge {
                path: target_path.to_string(),
                size: metadata.len(),
                limit: self.limits.max_file_bytes,
            });
        }

        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        File::open(&resolved)
            .and_then(|file| file.take(self.limits.max_file_bytes).read_to_end(&mut bytes))
            .map_err(|error| unreadable(target_path, error))?;

        let sniff = &bytes[..bytes.len().min(self.limits.binary_sniff_bytes)];
        if sniff.contains(&0) {
            return Err(ToolError::Binary(target_path.to_string()));
        }
        let content =
            String::from_utf8(bytes).map_err(|_| ToolError::Binary(target_path.to_string()))?;

        let (content, truncated) = truncate_content(content, self.limits.max_content_bytes);
        Ok(FileContent {
            path: target_path.to_string(),
            content,
            truncated,
        })
    }

    /// Lexical check first so escaping paths are refused without touching the
    /// filesystem, then a canonical check to catch symlinks leaving the root.
    fn resolve(&self, target_path: &str) -> Result<PathBuf, ToolError> {
        let trimmed = target_path.trim();
        if trimmed.is_empty() {
            return Err(ToolError::EmptyPath);
        }

        let candidate = normalize(&self.workspace_root.join(trimmed));
        if !candidate.starts_with(&self.workspace_root) {
            return Err(ToolError::OutsideWorkspace(target_path.to_string()));
        }

        let canonical = candidate.canonicalize().map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound(target_path.to_string())
            } else {
                unreadable(target_path, error)
            }
        })?;
        if !canonical.starts_with(&self.workspace_root) {
            return Err(ToolError::OutsideWorkspace(target_path.to_string()));
        }
        Ok(canonical)
    }
}

fn unreadable(path: &str, error: std::io::Error) -> ToolError {
    ToolError::Unreadable {
        path: path.to_string(),
        reason: error.to_string(),
    }
}

/// Resolves `.` and `..` components without consulting the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn truncate_content(content: String, max_bytes: usize) -> (String, bool) {
    if content.len() <= max_bytes {
        return (content, false);
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let total = content.len();
    let mut truncated = content[..cutoff].to_string();
    truncated.push_str(&format!(
        "\n[truncated: showing first {cutoff} of {total} bytes]"
    ));
    (truncated, true)
}
