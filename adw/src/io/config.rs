//! Workflow descriptors (`<config-root>/<name>.yaml` or `.toml`).
//!
//! Loading resolves the prompt, applies CLI overrides, checks that every
//! context file exists and settles the log path. Nothing is created or written
//! here: a descriptor that fails to load leaves no trace.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::types::EvaluatorKind;
use crate::error::ConfigError;
use crate::io::command::DEFAULT_COMMAND_TIMEOUT;
use crate::io::process::ProcessLimits;

/// Conventional root for workflow descriptors, relative to the working directory.
pub const DEFAULT_CONFIG_ROOT: &str = "config/adw";
/// Log directory under the config root.
pub const LOGS_DIR: &str = "logs";

const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["yaml", "yml", "toml"];
const PROMPT_FILE_EXTENSIONS: [&str; 2] = [".md", ".txt"];

/// What to do when the coder capability raises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoderErrorPolicy {
    /// Stop the run immediately as failed.
    #[default]
    Abort,
    /// Log the error and still execute and evaluate this iteration.
    Continue,
}

/// Operational knobs. Every field has a default, so the whole table is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunSettings {
    /// Wall-clock limit for the validation command.
    pub command_timeout_secs: u64,
    /// Wall-clock limit for one coder invocation.
    pub coder_timeout_secs: u64,
    /// Wall-clock limit for one judgment call.
    pub judge_timeout_secs: u64,
    /// Bytes kept per output stream of any child process.
    pub output_limit_bytes: usize,
    /// Characters of previous execution output repeated in retry prompts.
    pub prompt_output_limit_chars: usize,
    pub on_coder_error: CoderErrorPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
            coder_timeout_secs: 30 * 60,
            judge_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            prompt_output_limit_chars: 2_000,
            on_coder_error: CoderErrorPolicy::Abort,
        }
    }
}

impl RunSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zeroes = [
            ("command_timeout_secs", self.command_timeout_secs == 0),
            ("coder_timeout_secs", self.coder_timeout_secs == 0),
            ("judge_timeout_secs", self.judge_timeout_secs == 0),
            ("output_limit_bytes", self.output_limit_bytes == 0),
            ("prompt_output_limit_chars", self.prompt_output_limit_chars == 0),
        ];
        for (name, is_zero) in zeroes {
            if is_zero {
                return Err(ConfigError::Invalid(format!("settings.{name} must be > 0")));
            }
        }
        Ok(())
    }

    pub fn command_limits(&self) -> ProcessLimits {
        self.limits(self.command_timeout_secs)
    }

    pub fn coder_limits(&self) -> ProcessLimits {
        self.limits(self.coder_timeout_secs)
    }

    pub fn judge_limits(&self) -> ProcessLimits {
        self.limits(self.judge_timeout_secs)
    }

    fn limits(&self, secs: u64) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

/// Descriptor as written on disk, before resolution.
#[derive(Debug, Clone, Deserialize)]
struct Descriptor {
    prompt: String,
    coder_model: String,
    evaluator_model: String,
    #[serde(default = "default_max_iterations")]
    max_iterations: u32,
    execution_command: String,
    context_editable: Vec<PathBuf>,
    #[serde(default)]
    context_read_only: Vec<PathBuf>,
    #[serde(default = "default_evaluator_tag")]
    evaluator: String,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    settings: RunSettings,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_evaluator_tag() -> String {
    EvaluatorKind::Default.as_str().to_string()
}

/// Fully resolved, immutable configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Descriptor file stem.
    pub name: String,
    /// Task prompt text (file references already read).
    pub prompt: String,
    pub coder_model: String,
    pub evaluator_model: String,
    pub max_iterations: u32,
    pub execution_command: String,
    pub context_editable: Vec<PathBuf>,
    pub context_read_only: Vec<PathBuf>,
    pub evaluator: EvaluatorKind,
    /// Tag exactly as written, kept to report fallbacks.
    pub evaluator_tag: String,
    pub log_file: PathBuf,
    pub settings: RunSettings,
}

impl WorkflowConfig {
    /// Whether the descriptor named an evaluator this build does not know.
    pub fn evaluator_fell_back(&self) -> bool {
        EvaluatorKind::from_tag(&self.evaluator_tag).is_none()
    }
}

/// Caller-side inputs to [`load_workflow`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub config_root: PathBuf,
    /// Replaces the descriptor prompt: file contents when it names an existing file,
    /// otherwise the literal text.
    pub prompt_override: Option<String>,
    /// Replaces the editable set with this directory's files and adds the
    /// directory itself to the read-only set.
    pub context_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_root: PathBuf::from(DEFAULT_CONFIG_ROOT),
            prompt_override: None,
            context_dir: None,
        }
    }
}

/// Locate a descriptor given either a path or a bare workflow name.
pub fn resolve_workflow_path(workflow: &str, config_root: &Path) -> Result<PathBuf, ConfigError> {
    let direct = PathBuf::from(workflow);
    if direct.is_file() {
        return Ok(direct);
    }
    for ext in DESCRIPTOR_EXTENSIONS {
        let candidate = config_root.join(format!("{workflow}.{ext}"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(ConfigError::DescriptorNotFound(direct))
}

/// Load, resolve and validate a workflow descriptor.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_workflow(path: &Path, options: &LoadOptions) -> Result<WorkflowConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::DescriptorNotFound(path.to_path_buf()));
    }
    let raw = read_text(path)?;
    let descriptor = parse_descriptor(path, &raw)?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string());
    let base_dir = path.parent().unwrap_or(Path::new("."));

    let prompt = match &options.prompt_override {
        Some(value) => resolve_prompt_override(value)?,
        None => resolve_prompt(&descriptor.prompt, base_dir, &options.config_root)?,
    };

    let (context_editable, context_read_only) = match &options.context_dir {
        Some(dir) => context_from_dir(dir, descriptor.context_read_only)?,
        None => (descriptor.context_editable, descriptor.context_read_only),
    };

    if descriptor.max_iterations == 0 {
        return Err(ConfigError::Invalid("max_iterations must be >= 1".to_string()));
    }
    for (field, value) in [
        ("coder_model", &descriptor.coder_model),
        ("evaluator_model", &descriptor.evaluator_model),
        ("execution_command", &descriptor.execution_command),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{field} must not be empty")));
        }
    }
    if prompt.trim().is_empty() {
        return Err(ConfigError::Invalid("prompt must not be empty".to_string()));
    }
    ensure_exist("context_editable", &context_editable)?;
    ensure_exist("context_read_only", &context_read_only)?;
    descriptor.settings.validate()?;

    let log_file = resolve_log_path(
        descriptor.log_file.as_deref(),
        &name,
        &options.config_root,
    );
    debug!(name = %name, log_file = %log_file.display(), "workflow loaded");

    Ok(WorkflowConfig {
        name,
        prompt,
        coder_model: descriptor.coder_model,
        evaluator_model: descriptor.evaluator_model,
        max_iterations: descriptor.max_iterations,
        execution_command: descriptor.execution_command,
        context_editable,
        context_read_only,
        evaluator: EvaluatorKind::resolve(&descriptor.evaluator),
        evaluator_tag: descriptor.evaluator,
        log_file,
        settings: descriptor.settings,
    })
}

/// Place the run log.
///
/// Absolute paths are kept; relative paths with directories are taken from the
/// config root; bare file names go into `<root>/logs/`; no entry means
/// `<root>/logs/<workflow>.log`.
pub fn resolve_log_path(log_file: Option<&Path>, workflow: &str, config_root: &Path) -> PathBuf {
    match log_file {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) if path.components().count() > 1 => config_root.join(path),
        Some(path) => config_root.join(LOGS_DIR).join(path),
        None => config_root.join(LOGS_DIR).join(format!("{workflow}.log")),
    }
}

/// `true` when a prompt value names a text/markdown file rather than holding the text.
pub fn is_prompt_file_reference(prompt: &str) -> bool {
    let trimmed = prompt.trim();
    !trimmed.contains('\n')
        && PROMPT_FILE_EXTENSIONS
            .iter()
            .any(|ext| trimmed.ends_with(ext))
}

fn parse_descriptor(path: &Path, raw: &str) -> Result<Descriptor, ConfigError> {
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(raw).map_err(|err| err.to_string())
    } else {
        serde_yaml::from_str(raw).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn resolve_prompt(prompt: &str, base_dir: &Path, config_root: &Path) -> Result<String, ConfigError> {
    if !is_prompt_file_reference(prompt) {
        return Ok(prompt.to_string());
    }
    let reference = PathBuf::from(prompt.trim());
    let candidates = [
        reference.clone(),
        base_dir.join(&reference),
        config_root.join(&reference),
    ];
    match candidates.iter().find(|candidate| candidate.is_file()) {
        Some(found) => read_text(found),
        None => Err(ConfigError::PromptNotFound(reference)),
    }
}

fn resolve_prompt_override(value: &str) -> Result<String, ConfigError> {
    let path = Path::new(value);
    if path.is_file() {
        return read_text(path);
    }
    Ok(value.to_string())
}

fn context_from_dir(
    dir: &Path,
    mut read_only: Vec<PathBuf>,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::MissingContextFile {
            category: "context directory",
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut editable = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            editable.push(path);
        }
    }
    editable.sort();
    if !read_only.iter().any(|existing| existing == dir) {
        read_only.push(dir.to_path_buf());
    }
    Ok((editable, read_only))
}

fn ensure_exist(category: &'static str, paths: &[PathBuf]) -> Result<(), ConfigError> {
    match paths.iter().find(|path| !path.exists()) {
        Some(missing) => Err(ConfigError::MissingContextFile {
            category,
            path: missing.clone(),
        }),
        None => Ok(()),
    }
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
        path
    }

    fn options(root: &Path) -> LoadOptions {
        LoadOptions {
            config_root: root.join("config/adw"),
            ..LoadOptions::default()
        }
    }

    #[test]
    fn loads_yaml_with_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let editable = write(temp.path(), "app.py", "print('hi')\n");
        let descriptor = write(
            temp.path(),
            "config/adw/basic.yaml",
            &format!(
                "prompt: Make it print hello\n\
                 coder_model: gpt-4o\n\
                 evaluator_model: gpt-4o\n\
                 execution_command: python app.py\n\
                 context_editable:\n  - {}\n",
                editable.display()
            ),
        );

        let cfg = load_workflow(&descriptor, &options(temp.path())).expect("load");

        assert_eq!(cfg.name, "basic");
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.evaluator, EvaluatorKind::Default);
        assert!(!cfg.evaluator_fell_back());
        assert_eq!(cfg.settings, RunSettings::default());
        assert_eq!(
            cfg.log_file,
            temp.path().join("config/adw/logs/basic.log")
        );
    }

    #[test]
    fn loads_toml_descriptor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let editable = write(temp.path(), "lib.rs", "");
        let descriptor = write(
            temp.path(),
            "flow.toml",
            &format!(
                "prompt = \"fix it\"\n\
                 coder_model = \"claude-sonnet\"\n\
                 evaluator_model = \"claude-sonnet\"\n\
                 max_iterations = 2\n\
                 execution_command = \"cargo test\"\n\
                 context_editable = [\"{}\"]\n\
                 evaluator = \"structured\"\n\
                 [settings]\n\
                 command_timeout_secs = 60\n\
                 on_coder_error = \"continue\"\n",
                editable.display()
            ),
        );

        let cfg = load_workflow(&descriptor, &options(temp.path())).expect("load");

        assert_eq!(cfg.max_iterations, 2);
        assert_eq!(cfg.evaluator, EvaluatorKind::Structured);
        assert_eq!(cfg.settings.command_timeout_secs, 60);
        assert_eq!(cfg.settings.on_coder_error, CoderErrorPolicy::Continue);
        assert_eq!(cfg.settings.judge_timeout_secs, 600);
    }

    #[test]
    fn reads_prompt_file_next_to_descriptor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let editable = write(temp.path(), "app.py", "");
        write(temp.path(), "config/adw/task.md", "# Task\nDo the thing\n");
        let descriptor = write(
            temp.path(),
            "config/adw/flow.yaml",
            &format!(
                "prompt: task.md\ncoder_model: m\nevaluator_model: gpt-4\n\
                 execution_command: 'true'\ncontext_editable: [{}]\n",
                editable.display()
            ),
        );

        let cfg = load_workflow(&descriptor, &options(temp.path())).expect("load");
        assert_eq!(cfg.prompt, "# Task\nDo the thing\n");
    }

    #[test]
    fn missing_prompt_file_is_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: nowhere.md\ncoder_model: m\nevaluator_model: m\n\
             execution_command: 'true'\ncontext_editable: []\n",
        );

        let err = load_workflow(&descriptor, &options(temp.path())).unwrap_err();
        assert!(matches!(err, ConfigError::PromptNotFound(_)));
    }

    #[test]
    fn missing_editable_file_is_config_error_without_side_effects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: go\ncoder_model: m\nevaluator_model: m\n\
             execution_command: 'true'\ncontext_editable: [does/not/exist.py]\n",
        );

        let err = load_workflow(&descriptor, &options(temp.path())).unwrap_err();
        match err {
            ConfigError::MissingContextFile { category, path } => {
                assert_eq!(category, "context_editable");
                assert_eq!(path, PathBuf::from("does/not/exist.py"));
            }
            other => panic!("expected missing file, got {other:?}"),
        }
        assert!(!temp.path().join("config/adw/logs").exists());
    }

    #[test]
    fn zero_iterations_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: go\ncoder_model: m\nevaluator_model: m\nmax_iterations: 0\n\
             execution_command: 'true'\ncontext_editable: []\n",
        );
        let err = load_workflow(&descriptor, &options(temp.path())).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn unknown_evaluator_tag_falls_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: go\ncoder_model: m\nevaluator_model: m\nevaluator: custom\n\
             execution_command: 'true'\ncontext_editable: []\n",
        );
        let cfg = load_workflow(&descriptor, &options(temp.path())).expect("load");
        assert_eq!(cfg.evaluator, EvaluatorKind::Default);
        assert!(cfg.evaluator_fell_back());
    }

    #[test]
    fn prompt_override_prefers_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let override_file = write(temp.path(), "custom.md", "from file");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: original\ncoder_model: m\nevaluator_model: m\n\
             execution_command: 'true'\ncontext_editable: []\n",
        );

        let mut opts = options(temp.path());
        opts.prompt_override = Some(override_file.display().to_string());
        assert_eq!(load_workflow(&descriptor, &opts).expect("load").prompt, "from file");

        opts.prompt_override = Some("literal text".to_string());
        assert_eq!(
            load_workflow(&descriptor, &opts).expect("load").prompt,
            "literal text"
        );
    }

    #[test]
    fn context_dir_replaces_editable_set() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = temp.path().join("ctx");
        write(&ctx, "b.py", "");
        write(&ctx, "a.py", "");
        fs::create_dir_all(ctx.join("nested")).expect("mkdir");
        let descriptor = write(
            temp.path(),
            "flow.yaml",
            "prompt: go\ncoder_model: m\nevaluator_model: m\n\
             execution_command: 'true'\ncontext_editable: [gone.py]\n",
        );

        let mut opts = options(temp.path());
        opts.context_dir = Some(ctx.clone());
        let cfg = load_workflow(&descriptor, &opts).expect("load");

        assert_eq!(cfg.context_editable, vec![ctx.join("a.py"), ctx.join("b.py")]);
        assert_eq!(cfg.context_read_only, vec![ctx]);
    }

    #[test]
    fn log_path_resolution_rules() {
        let root = Path::new("config/adw");
        assert_eq!(
            resolve_log_path(Some(Path::new("run.log")), "w", root),
            PathBuf::from("config/adw/logs/run.log")
        );
        assert_eq!(
            resolve_log_path(Some(Path::new("custom/run.log")), "w", root),
            PathBuf::from("config/adw/custom/run.log")
        );
        assert_eq!(
            resolve_log_path(Some(Path::new("/tmp/run.log")), "w", root),
            PathBuf::from("/tmp/run.log")
        );
        assert_eq!(
            resolve_log_path(None, "pager", root),
            PathBuf::from("config/adw/logs/pager.log")
        );
    }

    #[test]
    fn resolves_workflow_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("config/adw");
        let path = write(&root, "basic.yml", "");
        assert_eq!(resolve_workflow_path("basic", &root).expect("resolve"), path);
        assert!(matches!(
            resolve_workflow_path("missing", &root),
            Err(ConfigError::DescriptorNotFound(_))
        ));
    }

    #[test]
    fn zero_timeout_rejected() {
        let settings = RunSettings {
            command_timeout_secs: 0,
            ..RunSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn timeout_above_u32_range_is_accepted() {
        let settings = RunSettings {
            command_timeout_secs: 1 << 32,
            ..RunSettings::default()
        };
        assert!(settings.validate().is_ok());
    }
}
