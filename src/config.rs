use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

// ── Categories and prompt templates ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: i64,
    pub category_id: i64,
    pub title: String,
    /// May contain the literal markers `{content}` and `{question}`.
    pub content: String,
}

/// Label shown for a template whose category id no longer resolves.
pub const UNKNOWN_CATEGORY: &str = "unknown category";

// ── Config ────────────────────────────────────────────────────────────────────

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个网页内容分析助手，能够根据用户的需求分析网页内容并提供有用的信息。";

/// Process-wide settings. Read fresh from the store on every completion
/// request; never cached in memory beyond a single operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    /// UI language, "zh-CN" or "en".
    pub language: String,
    pub categories: Vec<Category>,
    pub prompts: Vec<PromptTemplate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            language: "zh-CN".to_string(),
            categories: default_categories(),
            prompts: default_prompts(),
        }
    }
}

impl Config {
    /// Look up a prompt template by id.
    pub fn template(&self, id: i64) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Category name for an id. Dangling references degrade to a sentinel
    /// label, never a failure.
    pub fn category_name(&self, id: i64) -> &str {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    /// Number of templates a `delete_category` of this id would cascade to.
    pub fn template_count(&self, category_id: i64) -> usize {
        self.prompts
            .iter()
            .filter(|p| p.category_id == category_id)
            .count()
    }

    /// Add a category. Names must be unique (case-sensitive exact match).
    pub fn add_category(&mut self, name: &str) -> Result<i64> {
        if self.categories.iter().any(|c| c.name == name) {
            return Err(Error::Configuration(format!(
                "category '{name}' already exists"
            )));
        }
        let id = self.categories.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        self.categories.push(Category {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    /// Rename a category, enforcing the same uniqueness rule as create.
    pub fn rename_category(&mut self, id: i64, name: &str) -> Result<()> {
        if self.categories.iter().any(|c| c.name == name && c.id != id) {
            return Err(Error::Configuration(format!(
                "category '{name}' already exists"
            )));
        }
        let cat = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::Configuration(format!("no category with id {id}")))?;
        cat.name = name.to_string();
        Ok(())
    }

    /// Delete a category and cascade to every template that referenced it.
    pub fn delete_category(&mut self, id: i64) {
        self.categories.retain(|c| c.id != id);
        self.prompts.retain(|p| p.category_id != id);
    }

    pub fn add_prompt(&mut self, category_id: i64, title: &str, content: &str) -> i64 {
        let id = self.prompts.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        self.prompts.push(PromptTemplate {
            id,
            category_id,
            title: title.to_string(),
            content: content.to_string(),
        });
        id
    }

    pub fn update_prompt(&mut self, id: i64, title: &str, content: &str) -> Result<()> {
        let prompt = self
            .prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::Configuration(format!("no prompt with id {id}")))?;
        prompt.title = title.to_string();
        prompt.content = content.to_string();
        Ok(())
    }

    pub fn delete_prompt(&mut self, id: i64) {
        self.prompts.retain(|p| p.id != id);
    }
}

// ── Config store ──────────────────────────────────────────────────────────────

/// TOML-backed config store. Seeds defaults on first load when no file exists.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            path: config_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the config, writing the seeded defaults first if no file exists yet.
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(config)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weainote")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Export / import ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub version: String,
    #[serde(default)]
    pub export_date: String,
    pub config: Config,
}

/// Snapshot the full config as an export file.
pub fn export_config(config: &Config) -> ExportFile {
    ExportFile {
        version: "1.0".to_string(),
        export_date: Utc::now().to_rfc3339(),
        config: config.clone(),
    }
}

pub fn export_to_json(config: &Config) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&export_config(config)).context("serializing export file")
}

/// Parse an export file. Rejects (without partially applying anything) when
/// `version` or `config` is missing.
pub fn import_config(raw: &str) -> Result<Config> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::Configuration(format!("invalid import file: {e}")))?;
    if value.get("version").is_none() || value.get("config").is_none() {
        return Err(Error::Configuration(
            "import file is missing 'version' or 'config'".to_string(),
        ));
    }
    let file: ExportFile = serde_json::from_value(value)
        .map_err(|e| Error::Configuration(format!("invalid import file: {e}")))?;
    Ok(file.config)
}

// ── Seed data (applied once, on first run) ────────────────────────────────────

fn default_categories() -> Vec<Category> {
    [
        (1, "网页总结"),
        (2, "内容翻译"),
        (3, "关键点提取"),
        (4, "问答助手"),
        (5, "写作辅助"),
    ]
    .into_iter()
    .map(|(id, name)| Category {
        id,
        name: name.to_string(),
    })
    .collect()
}

fn default_prompts() -> Vec<PromptTemplate> {
    [
        (1, 1, "总结网页内容", "请总结以下网页内容，提取主要观点和关键信息：\n\n{content}"),
        (2, 2, "翻译为中文", "请将以下内容翻译为中文：\n\n{content}"),
        (3, 3, "提取关键点", "请从以下内容中提取5个关键点：\n\n{content}"),
        (4, 4, "解答问题", "请基于以下网页内容回答用户的问题：\n\n{content}\n\n用户问题：{question}"),
        (5, 4, "解释概念", "请解释以下内容中的专业概念或术语：\n\n{content}"),
        (6, 5, "改写文本", "请改写以下文本，使其更加流畅和易读：\n\n{content}"),
        (7, 5, "生成大纲", "请为以下内容生成一个结构化的大纲：\n\n{content}"),
    ]
    .into_iter()
    .map(|(id, category_id, title, content)| PromptTemplate {
        id,
        category_id,
        title: title.to_string(),
        content: content.to_string(),
    })
    .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
