//! Built-in tool adapters (§6, §9's "C9").
//!
//! Bridges the crate's existing, already-battle-tested tool bodies in
//! [`cloudllm::tools`](crate::cloudllm::tools) (`FileSystemTool`, `BashTool`) to the
//! `name(args) -> String` contract [`ToolBody`] expects. Nothing here re-implements file I/O or
//! process spawning; the read-before-write invariant and the one-by-one todo bookkeeping are the
//! only logic that's genuinely new, because they live in [`ToolContext`], which
//! `cloudllm::tools` has no notion of.
//!
//! `glob`/`grep` are grounded the same way ripgrep-style tools are built elsewhere in the
//! retrieved pack: `walkdir` for traversal, `globset` for pattern matching, `regex` for content
//! search (§6 calls these contract-only; this is one faithful implementation of that contract,
//! not the only one a host could choose).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use globset::GlobBuilder;
use regex::RegexBuilder;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use walkdir::WalkDir;

use crate::cloudllm::tools::{BashTool, FileSystemTool};

use super::tool_context::{ToolContext, TODOS_KEY};
use super::tool_registry::{ToolBody, ToolSchema};

fn to_absolute(path: &str) -> Result<PathBuf, String> {
    let p = Path::new(path);
    if !p.is_absolute() {
        return Err(format!("file_path must be absolute, got '{}'", path));
    }
    Ok(p.to_path_buf())
}

/// `FileSystemTool::validate_path` unconditionally rejects absolute paths (it's built to confine
/// relative paths under an optional root), while this contract requires absolute `file_path`s
/// (§6). Rooting the tool at `/` and stripping the leading separator before every call bridges
/// the two without touching `FileSystemTool` itself.
fn root_relative(absolute: &Path) -> String {
    absolute.strip_prefix("/").unwrap_or(absolute).to_string_lossy().to_string()
}

/// Constructs the [`FileSystemTool`] the read/edit/write adapters share, rooted at `/` so
/// `root_relative` paths resolve back to the original absolute location.
pub fn rooted_filesystem_tool() -> FileSystemTool {
    FileSystemTool::new().with_root_path(PathBuf::from("/"))
}

/// `read(file_path, offset?, limit?)` — cat -n-style numbered output; marks the path read.
pub struct ReadTool {
    fs: Arc<FileSystemTool>,
}

impl ReadTool {
    pub fn new(fs: Arc<FileSystemTool>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ToolBody for ReadTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "read",
            "Read a file from the local filesystem, with line numbers.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Absolute path to the file"},
                    "offset": {"type": "integer", "description": "Line number to start reading from"},
                    "limit": {"type": "integer", "description": "Number of lines to read"}
                },
                "required": ["file_path"]
            }),
        )
    }

    async fn execute(&self, context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let file_path = args.get("file_path").and_then(Value::as_str).ok_or("file_path is required")?;
        let absolute = to_absolute(file_path)?;
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;
        let limit = args.get("limit").and_then(Value::as_u64).map(|n| n as usize);

        let content = self.fs.read_file(&root_relative(&absolute)).await.map_err(|e| e.to_string())?;

        let lines: Vec<&str> = content.lines().collect();
        let start = offset.saturating_sub(1).min(lines.len());
        let end = limit.map(|l| (start + l).min(lines.len())).unwrap_or(lines.len());

        let numbered: String = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", start + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        context.lock().await.mark_file_read(absolute.to_string_lossy().to_string());
        Ok(numbered)
    }
}

/// `edit(file_path, old_string, new_string, replace_all?)` — read-before-write enforced against
/// [`ToolContext::was_file_read`].
pub struct EditTool {
    fs: Arc<FileSystemTool>,
}

impl EditTool {
    pub fn new(fs: Arc<FileSystemTool>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ToolBody for EditTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "edit",
            "Replace an exact string occurrence in a file that has already been read.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"},
                    "replace_all": {"type": "boolean", "description": "Replace every occurrence (default false)"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        )
    }

    async fn execute(&self, context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let file_path = args.get("file_path").and_then(Value::as_str).ok_or("file_path is required")?;
        let old_string = args.get("old_string").and_then(Value::as_str).ok_or("old_string is required")?;
        let new_string = args.get("new_string").and_then(Value::as_str).ok_or("new_string is required")?;
        let replace_all = args.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        if old_string == new_string {
            return Err("old_string and new_string must differ".to_string());
        }

        let absolute = to_absolute(file_path)?;
        let absolute_str = absolute.to_string_lossy().to_string();

        if !context.lock().await.was_file_read(&absolute_str) {
            return Err(format!("'{}' must be read before it can be edited", file_path));
        }

        let relative = root_relative(&absolute);
        let content = self.fs.read_file(&relative).await.map_err(|e| e.to_string())?;
        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return Err(format!("old_string not found in '{}'", file_path));
        }
        if occurrences > 1 && !replace_all {
            return Err(format!(
                "old_string occurs {} times in '{}'; pass replace_all or supply a more specific match",
                occurrences, file_path
            ));
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        self.fs.write_file(&relative, &updated).await.map_err(|e| e.to_string())?;
        Ok(format!("Edited '{}'", file_path))
    }
}

/// `write(file_path, content)` — existing files must have been read first; new files are created
/// freely (parent directories too, via `FileSystemTool::write_file`).
pub struct WriteTool {
    fs: Arc<FileSystemTool>,
}

impl WriteTool {
    pub fn new(fs: Arc<FileSystemTool>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl ToolBody for WriteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "write",
            "Write content to a file, creating it (and parent directories) if needed.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["file_path", "content"]
            }),
        )
    }

    async fn execute(&self, context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let file_path = args.get("file_path").and_then(Value::as_str).ok_or("file_path is required")?;
        let content = args.get("content").and_then(Value::as_str).ok_or("content is required")?;
        let absolute = to_absolute(file_path)?;
        let absolute_str = absolute.to_string_lossy().to_string();
        let relative = root_relative(&absolute);

        let exists = self.fs.file_exists(&relative).await.map_err(|e| e.to_string())?;
        if exists && !context.lock().await.was_file_read(&absolute_str) {
            return Err(format!("'{}' exists and must be read before it can be overwritten", file_path));
        }

        self.fs.write_file(&relative, content).await.map_err(|e| e.to_string())?;
        context.lock().await.mark_file_read(absolute_str);
        Ok(format!("Wrote '{}'", file_path))
    }
}

/// `bash(command, timeout_ms?, command_description?)` — exit-code-prefixed, tail-truncated output.
pub struct BashToolAdapter {
    bash: BashTool,
}

const BASH_OUTPUT_CAP: usize = 30_000;

impl BashToolAdapter {
    pub fn new(bash: BashTool) -> Self {
        Self { bash }
    }

    fn truncate_tail(s: &str) -> String {
        if s.chars().count() <= BASH_OUTPUT_CAP {
            s.to_string()
        } else {
            let chars: Vec<char> = s.chars().collect();
            chars[chars.len() - BASH_OUTPUT_CAP..].iter().collect()
        }
    }
}

#[async_trait]
impl ToolBody for BashToolAdapter {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "bash",
            "Execute a shell command and capture its output.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_ms": {"type": "integer", "description": "Max 600000"},
                    "command_description": {"type": "string"}
                },
                "required": ["command"]
            }),
        )
    }

    async fn execute(&self, _context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let command = args.get("command").and_then(Value::as_str).ok_or("command is required")?;
        let timeout_ms = args.get("timeout_ms").and_then(Value::as_u64);

        let runner = match timeout_ms {
            Some(ms) => self.bash.clone().with_timeout((ms / 1000).max(1)),
            None => self.bash.clone(),
        };

        let result = runner.execute(command).await.map_err(|e| e.to_string())?;
        let combined = if result.stderr.is_empty() {
            result.stdout
        } else {
            format!("{}{}", result.stdout, result.stderr)
        };
        Ok(format!("Exit code: {}\n{}", result.exit_code, Self::truncate_tail(&combined)))
    }
}

/// `glob(pattern, path?)` — newest-mtime-first absolute paths, skipping VCS/build directories the
/// way a `.gitignore`-aware walk would.
pub struct GlobTool {
    default_root: PathBuf,
}

impl GlobTool {
    pub fn new(default_root: PathBuf) -> Self {
        Self { default_root }
    }
}

fn resolve_search_root(default_root: &Path, args: &Value) -> PathBuf {
    args.get("path")
        .and_then(Value::as_str)
        .map(|p| {
            let p = Path::new(p);
            if p.is_absolute() { p.to_path_buf() } else { default_root.join(p) }
        })
        .unwrap_or_else(|| default_root.to_path_buf())
}

fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules" || name == "target"
}

#[async_trait]
impl ToolBody for GlobTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "glob",
            "Find files matching a glob pattern, newest modified first.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string"}
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn execute(&self, _context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let pattern = args.get("pattern").and_then(Value::as_str).ok_or("pattern is required")?;
        let search_root = resolve_search_root(&self.default_root, &args);

        let matcher = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| format!("invalid glob pattern: {}", e))?
            .compile_matcher();

        let mut matches: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&search_root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !is_ignored_dir(&e.file_name().to_string_lossy()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&search_root).unwrap_or(entry.path());
            if matcher.is_match(rel) {
                let mtime = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry.path().to_path_buf(), mtime));
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(matches.into_iter().map(|(p, _)| p.to_string_lossy().to_string()).collect::<Vec<_>>().join("\n"))
    }
}

/// `grep(pattern, path?, glob?, output_mode?, B?, A?, C?, n?, i?, type?, head_limit?, multiline?)`.
pub struct GrepTool {
    default_root: PathBuf,
}

impl GrepTool {
    pub fn new(default_root: PathBuf) -> Self {
        Self { default_root }
    }
}

fn type_extension(type_name: &str) -> Option<&'static str> {
    match type_name {
        "rust" => Some("rs"),
        "js" => Some("js"),
        "ts" => Some("ts"),
        "py" => Some("py"),
        "go" => Some("go"),
        "java" => Some("java"),
        _ => None,
    }
}

#[async_trait]
impl ToolBody for GrepTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "grep",
            "Search file contents with a regex pattern (ripgrep-style).",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string"},
                    "glob": {"type": "string"},
                    "output_mode": {"type": "string", "enum": ["files_with_matches", "content", "count"]},
                    "B": {"type": "integer"},
                    "A": {"type": "integer"},
                    "C": {"type": "integer"},
                    "n": {"type": "boolean"},
                    "i": {"type": "boolean"},
                    "type": {"type": "string"},
                    "head_limit": {"type": "integer"},
                    "multiline": {"type": "boolean"}
                },
                "required": ["pattern"]
            }),
        )
    }

    async fn execute(&self, _context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let pattern = args.get("pattern").and_then(Value::as_str).ok_or("pattern is required")?;
        let case_insensitive = args.get("i").and_then(Value::as_bool).unwrap_or(false);
        let multiline = args.get("multiline").and_then(Value::as_bool).unwrap_or(false);
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .dot_matches_new_line(multiline)
            .build()
            .map_err(|e| format!("invalid regex: {}", e))?;

        let context_before = args.get("B").and_then(Value::as_u64).or_else(|| args.get("C").and_then(Value::as_u64)).unwrap_or(0) as usize;
        let context_after = args.get("A").and_then(Value::as_u64).or_else(|| args.get("C").and_then(Value::as_u64)).unwrap_or(0) as usize;
        let show_line_numbers = args.get("n").and_then(Value::as_bool).unwrap_or(false);
        let output_mode = args.get("output_mode").and_then(Value::as_str).unwrap_or("files_with_matches");
        let head_limit = args.get("head_limit").and_then(Value::as_u64).map(|n| n as usize);

        let search_root = resolve_search_root(&self.default_root, &args);
        let glob_filter = args.get("glob").and_then(Value::as_str).and_then(|g| {
            GlobBuilder::new(g).literal_separator(false).build().ok().map(|g| g.compile_matcher())
        });
        let extension_filter = args.get("type").and_then(Value::as_str).and_then(type_extension);

        let mut results: Vec<String> = Vec::new();
        let mut total_matches = 0usize;

        let files: Vec<PathBuf> = if search_root.is_file() {
            vec![search_root.clone()]
        } else {
            WalkDir::new(&search_root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| !is_ignored_dir(&e.file_name().to_string_lossy()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .collect()
        };

        for path in files {
            if let Some(ref glob) = glob_filter {
                let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                if !glob.is_match(&name) {
                    continue;
                }
            }
            if let Some(ext) = extension_filter {
                if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                    continue;
                }
            }

            let Ok(bytes) = std::fs::read(&path) else { continue };
            if bytes.len() > 512 && bytes[..512].contains(&0) {
                continue;
            }
            let Ok(content) = String::from_utf8(bytes) else { continue };
            if !regex.is_match(&content) {
                continue;
            }

            match output_mode {
                "files_with_matches" => results.push(path.to_string_lossy().to_string()),
                "count" => {
                    let count = regex.find_iter(&content).count();
                    total_matches += count;
                    results.push(format!("{}:{}", path.display(), count));
                }
                _ if multiline => {
                    // `dot_matches_new_line` lets the pattern span lines, so matches have to be
                    // found against the full content and then mapped back to the lines they
                    // cover, rather than line-by-line like the single-line path below.
                    let lines: Vec<&str> = content.lines().collect();
                    let mut line_starts: Vec<usize> = vec![0];
                    for (idx, ch) in content.char_indices() {
                        if ch == '\n' {
                            line_starts.push(idx + 1);
                        }
                    }
                    let line_of = |byte_pos: usize| -> usize {
                        match line_starts.binary_search(&byte_pos) {
                            Ok(i) => i,
                            Err(i) => i - 1,
                        }
                    };
                    for m in regex.find_iter(&content) {
                        total_matches += 1;
                        let start_line = line_of(m.start());
                        let end_line = line_of(m.end().saturating_sub(1).max(m.start()));
                        let start = start_line.saturating_sub(context_before);
                        let end = (end_line + context_after + 1).min(lines.len());
                        for j in start..end {
                            let prefix = if j >= start_line && j <= end_line { ">" } else { " " };
                            if show_line_numbers {
                                results.push(format!("{}{}:{}:{}", prefix, path.display(), j + 1, lines[j]));
                            } else {
                                results.push(format!("{}{}:{}", prefix, path.display(), lines[j]));
                            }
                        }
                    }
                }
                _ => {
                    let lines: Vec<&str> = content.lines().collect();
                    for (i, line) in lines.iter().enumerate() {
                        if regex.is_match(line) {
                            total_matches += 1;
                            let start = i.saturating_sub(context_before);
                            let end = (i + context_after + 1).min(lines.len());
                            for j in start..end {
                                let prefix = if j == i { ">" } else { " " };
                                if show_line_numbers {
                                    results.push(format!("{}{}:{}:{}", prefix, path.display(), j + 1, lines[j]));
                                } else {
                                    results.push(format!("{}{}:{}", prefix, path.display(), lines[j]));
                                }
                            }
                        }
                    }
                }
            }

            if results.len() > 5000 {
                break;
            }
        }

        if let Some(limit) = head_limit {
            results.truncate(limit);
        }

        let _ = total_matches;
        Ok(format!("Exit code: 0\n{}", results.join("\n")))
    }
}

/// `todo_write(todos: [{task, status, priority}])` — invariant: at most one `in_progress`;
/// persisted to `context["todos"]` for the one-by-one gate (§4.4's GATE state) to read back.
pub struct TodoWriteTool;

#[async_trait]
impl ToolBody for TodoWriteTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::function(
            "todo_write",
            "Replace the current todo list.",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "task": {"type": "string"},
                                "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
                                "priority": {"type": "string", "enum": ["high", "medium", "low"]}
                            },
                            "required": ["task", "status", "priority"]
                        }
                    }
                },
                "required": ["todos"]
            }),
        )
    }

    async fn execute(&self, context: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
        let todos = args.get("todos").and_then(Value::as_array).ok_or("todos is required")?.clone();

        let in_progress = todos
            .iter()
            .filter(|t| t.get("status").and_then(Value::as_str) == Some("in_progress"))
            .count();
        if in_progress > 1 {
            return Err(format!("at most one todo may be in_progress, got {}", in_progress));
        }

        let summary = todos
            .iter()
            .map(|t| {
                format!(
                    "[{}] {} ({})",
                    t.get("status").and_then(Value::as_str).unwrap_or("pending"),
                    t.get("task").and_then(Value::as_str).unwrap_or(""),
                    t.get("priority").and_then(Value::as_str).unwrap_or("medium"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        context.lock().await.set(TODOS_KEY, Value::Array(todos));
        Ok(if summary.is_empty() { "Todo list cleared".to_string() } else { summary })
    }
}

/// Placeholder body for a contract-only tool (§4.8): `glob`/`grep` ship real implementations
/// above, but any other contract-only tool a host hasn't overridden yet (e.g. a vendor-specific
/// search tool) can be registered with this so the schema is still advertised to the model while
/// returning a clear refusal instead of panicking or silently doing nothing.
pub struct StubTool {
    schema: ToolSchema,
}

impl StubTool {
    pub fn new(schema: ToolSchema) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl ToolBody for StubTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, _context: Arc<Mutex<ToolContext>>, _args: Value) -> Result<String, String> {
        Err(format!(
            "'{}' has no implementation registered; the host application must override this tool",
            self.schema.function.name
        ))
    }
}

fn notebook_read_schema() -> ToolSchema {
    ToolSchema::function(
        "notebook_read",
        "Read a Jupyter notebook's cells (contract-only; override with a real implementation).",
        json!({
            "type": "object",
            "properties": {
                "notebook_path": {"type": "string", "description": "Absolute path to a .ipynb file"},
                "cell_id": {"type": "string", "description": "Read a single cell by id"}
            },
            "required": ["notebook_path"]
        }),
    )
}

fn notebook_edit_schema() -> ToolSchema {
    ToolSchema::function(
        "notebook_edit",
        "Edit a Jupyter notebook's cells (contract-only; override with a real implementation).",
        json!({
            "type": "object",
            "properties": {
                "notebook_path": {"type": "string", "description": "Absolute path to a .ipynb file"},
                "cell_id": {"type": "string"},
                "new_source": {"type": "string"},
                "cell_type": {"type": "string", "enum": ["code", "markdown"]},
                "edit_mode": {"type": "string", "enum": ["replace", "insert", "delete"]}
            },
            "required": ["notebook_path", "new_source"]
        }),
    )
}

/// `StubTool` instances pre-wired with the `notebook_read`/`notebook_edit` contracts named in §6.
/// A host that wants real notebook JSON manipulation registers a replacement body under the same
/// name; `ToolRegistry::register`'s same-schema check keeps the two from silently diverging.
pub fn notebook_stub_tools() -> Vec<Arc<dyn ToolBody>> {
    vec![
        Arc::new(StubTool::new(notebook_read_schema())),
        Arc::new(StubTool::new(notebook_edit_schema())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::tool_registry::ToolRegistry;
    use std::sync::Arc as StdArc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn read_then_edit_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let fs = StdArc::new(rooted_filesystem_tool());
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(ReadTool::new(fs.clone()))).await.unwrap();
        registry.register(StdArc::new(EditTool::new(fs.clone()))).await.unwrap();

        let path_str = path.to_string_lossy().to_string();
        registry.execute("read", json!({"file_path": path_str})).await;
        let outcome = registry
            .execute("edit", json!({"file_path": path_str, "old_string": "world", "new_string": "rust"}))
            .await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => assert!(s.starts_with("Edited")),
            _ => panic!("expected text outcome"),
        }

        let updated = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(updated, "hello rust");
    }

    #[tokio::test]
    async fn edit_without_prior_read_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.txt");
        tokio::fs::write(&path, "hello world").await.unwrap();

        let fs = StdArc::new(rooted_filesystem_tool());
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(EditTool::new(fs))).await.unwrap();

        let outcome = registry
            .execute(
                "edit",
                json!({"file_path": path.to_string_lossy(), "old_string": "world", "new_string": "rust"}),
            )
            .await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => {
                assert!(s.contains("must be read before it can be edited"))
            }
            _ => panic!("expected text outcome"),
        }
    }

    #[tokio::test]
    async fn edit_rejects_noop_replacement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.txt");
        tokio::fs::write(&path, "same").await.unwrap();
        let fs = StdArc::new(rooted_filesystem_tool());
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(ReadTool::new(fs.clone()))).await.unwrap();
        registry.register(StdArc::new(EditTool::new(fs))).await.unwrap();

        registry.execute("read", json!({"file_path": path.to_string_lossy()})).await;
        let outcome = registry
            .execute("edit", json!({"file_path": path.to_string_lossy(), "old_string": "same", "new_string": "same"}))
            .await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => assert!(s.contains("must differ")),
            _ => panic!("expected text outcome"),
        }
    }

    #[tokio::test]
    async fn write_to_unread_existing_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.txt");
        tokio::fs::write(&path, "existing").await.unwrap();
        let fs = StdArc::new(rooted_filesystem_tool());
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(WriteTool::new(fs))).await.unwrap();

        let outcome = registry.execute("write", json!({"file_path": path.to_string_lossy(), "content": "new"})).await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => {
                assert!(s.contains("must be read before it can be overwritten"))
            }
            _ => panic!("expected text outcome"),
        }
    }

    #[tokio::test]
    async fn write_to_new_file_succeeds_without_prior_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("e.txt");
        let fs = StdArc::new(rooted_filesystem_tool());
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(WriteTool::new(fs))).await.unwrap();

        let outcome = registry.execute("write", json!({"file_path": path.to_string_lossy(), "content": "new"})).await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => assert!(s.starts_with("Wrote")),
            _ => panic!("expected text outcome"),
        }
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn todo_write_rejects_more_than_one_in_progress() {
        let registry = ToolRegistry::new_root("root");
        registry.register(StdArc::new(TodoWriteTool)).await.unwrap();
        let outcome = registry
            .execute(
                "todo_write",
                json!({"todos": [
                    {"task": "a", "status": "in_progress", "priority": "high"},
                    {"task": "b", "status": "in_progress", "priority": "low"}
                ]}),
            )
            .await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => {
                assert!(s.starts_with("Error executing tool:"))
            }
            _ => panic!("expected text outcome"),
        }
    }

    #[tokio::test]
    async fn glob_finds_files_by_extension() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("x.rs"), "fn main() {}").await.unwrap();
        tokio::fs::write(dir.path().join("y.txt"), "not rust").await.unwrap();

        let tool = GlobTool::new(dir.path().to_path_buf());
        let ctx = Arc::new(Mutex::new(ToolContext::new()));
        let result = tool.execute(ctx, json!({"pattern": "**/*.rs"})).await.unwrap();
        assert!(result.contains("x.rs"));
        assert!(!result.contains("y.txt"));
    }

    #[tokio::test]
    async fn grep_finds_matching_lines_with_content_mode() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.rs"), "fn needle() {}\nfn other() {}").await.unwrap();

        let tool = GrepTool::new(dir.path().to_path_buf());
        let ctx = Arc::new(Mutex::new(ToolContext::new()));
        let result = tool
            .execute(ctx, json!({"pattern": "needle", "output_mode": "content"}))
            .await
            .unwrap();
        assert!(result.contains("needle"));
        assert!(!result.contains("fn other"));
    }

    #[tokio::test]
    async fn grep_content_mode_matches_a_pattern_spanning_lines_when_multiline() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("f.rs"), "struct Foo {\n    bar: u32,\n}\n").await.unwrap();

        let tool = GrepTool::new(dir.path().to_path_buf());
        let ctx = Arc::new(Mutex::new(ToolContext::new()));
        let result = tool
            .execute(
                ctx,
                json!({"pattern": "struct Foo \\{[\\s\\S]*?bar", "output_mode": "content", "multiline": true}),
            )
            .await
            .unwrap();
        assert!(result.contains("struct Foo"));
        assert!(result.contains("bar: u32"));
    }

    #[tokio::test]
    async fn notebook_stub_tools_advertise_schemas_but_refuse_to_run() {
        let registry = ToolRegistry::new_root("root");
        for tool in notebook_stub_tools() {
            registry.register(tool).await.unwrap();
        }
        let names = registry.get_tool_names().await;
        assert!(names.contains(&"notebook_read".to_string()));
        assert!(names.contains(&"notebook_edit".to_string()));

        let outcome = registry.execute("notebook_read", json!({"notebook_path": "/a.ipynb"})).await;
        match outcome {
            crate::cloudllm::agency::tool_registry::ToolOutcome::Text(s) => {
                assert!(s.contains("no implementation registered"))
            }
            _ => panic!("expected text outcome"),
        }
    }
}
