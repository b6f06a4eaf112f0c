//! Test doubles for the coder and judge capabilities, plus a temp workspace.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::EvaluatorKind;
use crate::error::{CoderInvocationError, JudgeError};
use crate::io::coder::{CodeRequest, Coder};
use crate::io::config::{RunSettings, WorkflowConfig};
use crate::io::judge::Judge;

const FIXTURE_PROMPT: &str = "Make the validation command pass";

/// Coder that records every request and can fail or edit files on chosen calls.
#[derive(Default)]
pub struct ScriptedCoder {
    requests: RefCell<Vec<CodeRequest>>,
    fail_on: Option<u32>,
    edits: Vec<(u32, PathBuf, String)>,
}

impl ScriptedCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th invocation (1-based).
    pub fn failing_on(mut self, call: u32) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Write `contents` to `path` during the `call`-th invocation (1-based).
    pub fn with_edit(mut self, call: u32, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.edits.push((call, path.into(), contents.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<CodeRequest> {
        self.requests.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Coder for ScriptedCoder {
    fn code(&self, request: &CodeRequest) -> Result<(), CoderInvocationError> {
        self.requests.borrow_mut().push(request.clone());
        let call = self.requests.borrow().len() as u32;
        if self.fail_on == Some(call) {
            return Err(CoderInvocationError::Failed {
                code: Some(1),
                stderr: format!("scripted failure on call {call}"),
            });
        }
        for (at, path, contents) in &self.edits {
            if *at == call {
                fs::write(path, contents).map_err(|err| CoderInvocationError::Spawn {
                    program: "scripted".to_string(),
                    source: err.into(),
                })?;
            }
        }
        Ok(())
    }
}

/// Judge that replays queued responses in order and records every prompt.
pub struct ScriptedJudge {
    responses: RefCell<VecDeque<Result<String, JudgeError>>>,
    prompts: RefCell<Vec<(String, String)>>,
    calls: Cell<usize>,
}

impl ScriptedJudge {
    pub fn new(responses: Vec<Result<String, JudgeError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
            calls: Cell::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    /// `(model, prompt)` for every call so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.borrow().clone()
    }
}

impl Judge for ScriptedJudge {
    fn judge(&self, model: &str, prompt: &str) -> Result<String, JudgeError> {
        self.calls.set(self.calls.get() + 1);
        self.prompts
            .borrow_mut()
            .push((model.to_string(), prompt.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(JudgeError::Io(anyhow!("scripted judge has no response left"))))
    }
}

/// `{success, feedback}` payload in a json fence, as a judge would answer.
pub fn verdict(success: bool, feedback: &str) -> String {
    format!(
        "```json\n{}\n```",
        serde_json::json!({ "success": success, "feedback": feedback })
    )
}

/// Temp directory holding one editable file and a config root.
pub struct WorkflowFixture {
    temp: TempDir,
    command: String,
}

impl WorkflowFixture {
    /// `command` runs through the shell with the fixture root as its working directory.
    pub fn new(command: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        fs::write(temp.path().join("app.py"), "print('hello')\n").context("write app.py")?;
        fs::create_dir_all(temp.path().join("config/adw")).context("create config root")?;
        Ok(Self {
            temp,
            command: command.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn config_root(&self) -> PathBuf {
        self.root().join("config/adw")
    }

    pub fn editable(&self) -> PathBuf {
        self.root().join("app.py")
    }

    pub fn prompt(&self) -> &'static str {
        FIXTURE_PROMPT
    }

    /// Shell command prefixed with a `cd` into the fixture root.
    pub fn command(&self) -> String {
        format!("cd '{}' && {}", self.root().display(), self.command)
    }

    /// Resolved configuration equivalent to [`Self::write_descriptor`].
    pub fn config(&self, evaluator: EvaluatorKind, max_iterations: u32) -> WorkflowConfig {
        WorkflowConfig {
            name: "fixture".to_string(),
            prompt: FIXTURE_PROMPT.to_string(),
            coder_model: "gpt-4o".to_string(),
            evaluator_model: "gpt-4o".to_string(),
            max_iterations,
            execution_command: self.command(),
            context_editable: vec![self.editable()],
            context_read_only: Vec::new(),
            evaluator,
            evaluator_tag: evaluator.as_str().to_string(),
            log_file: self.config_root().join("logs/fixture.log"),
            settings: RunSettings::default(),
        }
    }

    /// Write `<config-root>/<name>.yaml` and return its path.
    pub fn write_descriptor(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.config_root().join(format!("{name}.yaml"));
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Descriptor YAML for this fixture.
    pub fn descriptor_yaml(&self, evaluator: &str, max_iterations: u32) -> String {
        format!(
            "prompt: {FIXTURE_PROMPT}\n\
             coder_model: gpt-4o\n\
             evaluator_model: gpt-4o\n\
             max_iterations: {max_iterations}\n\
             execution_command: \"{}\"\n\
             context_editable:\n  - {}\n\
             evaluator: {evaluator}\n",
            self.command().replace('"', "\\\""),
            self.editable().display()
        )
    }
}
