//! Workflow discovery under the config root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::core::text::ellipsize;
use crate::io::config::is_prompt_file_reference;

const DESCRIPTION_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
}

/// Only the field a listing needs; the rest of the descriptor is not validated here.
#[derive(Debug, Deserialize)]
struct PromptOnly {
    #[serde(default)]
    prompt: Option<String>,
}

/// List workflow descriptors in `config_root`, sorted by name.
///
/// Hidden files and `*.example` files are skipped. A descriptor that cannot be
/// read still appears, with a placeholder description.
pub fn list_workflows(config_root: &Path) -> Result<Vec<WorkflowSummary>> {
    if !config_root.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(config_root)
        .with_context(|| format!("read config root {}", config_root.display()))?;

    let mut summaries = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("read config root {}", config_root.display()))?
            .path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') || file_name.ends_with(".example") || !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !matches!(ext, "yaml" | "yml" | "toml") {
            continue;
        }
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let description = describe(&path, ext, config_root);
        debug!(name = %name, "found workflow");
        summaries.push(WorkflowSummary { name, description });
    }
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(summaries)
}

fn describe(path: &Path, ext: &str, config_root: &Path) -> String {
    let Ok(raw) = fs::read_to_string(path) else {
        return "(unreadable descriptor)".to_string();
    };
    let parsed: Option<PromptOnly> = if ext == "toml" {
        toml::from_str(&raw).ok()
    } else {
        serde_yaml::from_str(&raw).ok()
    };
    let Some(prompt) = parsed.and_then(|doc| doc.prompt) else {
        return "(no description)".to_string();
    };

    let text = if is_prompt_file_reference(&prompt) {
        let reference = prompt.trim();
        let base = path.parent().unwrap_or(config_root);
        [base.join(reference), config_root.join(reference), reference.into()]
            .iter()
            .find_map(|candidate| fs::read_to_string(candidate).ok())
            .map(|contents| first_line(&contents).trim_start_matches("# ").to_string())
            .unwrap_or_else(|| format!("(prompt file {reference})"))
    } else {
        first_line(&prompt).to_string()
    };
    ellipsize(text.trim(), DESCRIPTION_WIDTH)
}

fn first_line(text: &str) -> &str {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
}
