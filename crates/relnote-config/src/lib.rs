use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RELNOTE_DIR_NAME: &str = ".relnote";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_API_KEY_ENV: &str = "RELNOTE_API_KEY";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_TOKEN_ENV: &str = "GITHUB_PERSONAL_ACCESS_TOKEN";
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 20;
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REPORT_LANGUAGE: &str = "English";
pub const DEFAULT_GOOD_FIRST_ISSUE_LABEL: &str = "good first issue";
pub const DEFAULT_GOOD_FIRST_ISSUE_COUNT: u32 = 2;
pub const DEFAULT_TRANSLATION_LANGUAGE: &str = "Chinese";
pub const DEFAULT_TRANSLATION_SUFFIX: &str = "ZH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InferenceProviderKind {
    #[default]
    Auto,
    Mock,
    OpenaiCompatible,
    Gemini,
}

impl InferenceProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Mock => "mock",
            Self::OpenaiCompatible => "openai_compatible",
            Self::Gemini => "gemini",
        }
    }
}

impl std::str::FromStr for InferenceProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "mock" => Ok(Self::Mock),
            "openai_compatible" => Ok(Self::OpenaiCompatible),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!(
                "invalid provider '{other}', expected one of: auto, mock, openai_compatible, gemini"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelnoteConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProviderKind::Auto,
            model: None,
            endpoint: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            token_env: default_github_token_env(),
            owner: None,
            repo: None,
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            timeout_secs: default_source_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_report_language")]
    pub language: String,
    #[serde(default = "default_good_first_issue_label")]
    pub good_first_issue_label: String,
    #[serde(default = "default_good_first_issue_count")]
    pub good_first_issue_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_normal_entries: Option<usize>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            language: default_report_language(),
            good_first_issue_label: default_good_first_issue_label(),
            good_first_issue_count: default_good_first_issue_count(),
            max_normal_entries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_translation_language")]
    pub target_language: String,
    #[serde(default = "default_translation_suffix")]
    pub file_suffix: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_language: default_translation_language(),
            file_suffix: default_translation_suffix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn relnote_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(RELNOTE_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    relnote_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RelnoteConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(RelnoteConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: RelnoteConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<RelnoteConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(relnote_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = RelnoteConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Reports settings that were accepted but will not behave as written.
///
/// Paging limits are kept as typed by [`load_workspace_config`]; the source
/// client clamps them when it builds its retrieval policy.
pub fn validate_config(config: &RelnoteConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.source.per_page > MAX_PER_PAGE {
        warnings.push(ConfigWarning {
            code: "source_per_page_clamped",
            message: format!(
                "source.per_page={} exceeds the API maximum, {} will be used",
                config.source.per_page, MAX_PER_PAGE
            ),
        });
    }

    if config.source.max_pages == 0 {
        warnings.push(ConfigWarning {
            code: "source_max_pages_zero",
            message: format!(
                "source.max_pages=0 would fetch nothing, {DEFAULT_MAX_PAGES} will be used"
            ),
        });
    }

    if config.inference.provider == InferenceProviderKind::OpenaiCompatible
        && normalize_optional(config.inference.endpoint.clone()).is_none()
    {
        warnings.push(ConfigWarning {
            code: "inference_endpoint_missing",
            message: "inference.provider=openai_compatible requires inference.endpoint".to_owned(),
        });
    }

    if config.translation.enabled && config.translation.file_suffix.trim().is_empty() {
        warnings.push(ConfigWarning {
            code: "translation_suffix_empty",
            message: format!(
                "translation.file_suffix is empty, '{DEFAULT_TRANSLATION_SUFFIX}' will be used"
            ),
        });
    }

    if config.report.max_normal_entries == Some(0) {
        warnings.push(ConfigWarning {
            code: "report_max_normal_entries_zero",
            message: "report.max_normal_entries=0 hides every non-highlighted change".to_owned(),
        });
    }

    warnings
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_owned()
}

fn default_inference_timeout_secs() -> u64 {
    DEFAULT_INFERENCE_TIMEOUT_SECS
}

fn default_github_api_base() -> String {
    DEFAULT_GITHUB_API_BASE.to_owned()
}

fn default_github_token_env() -> String {
    DEFAULT_GITHUB_TOKEN_ENV.to_owned()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_source_timeout_secs() -> u64 {
    DEFAULT_SOURCE_TIMEOUT_SECS
}

fn default_output_dir() -> String {
    ".".to_owned()
}

fn default_report_language() -> String {
    DEFAULT_REPORT_LANGUAGE.to_owned()
}

fn default_good_first_issue_label() -> String {
    DEFAULT_GOOD_FIRST_ISSUE_LABEL.to_owned()
}

fn default_good_first_issue_count() -> u32 {
    DEFAULT_GOOD_FIRST_ISSUE_COUNT
}

fn default_translation_language() -> String {
    DEFAULT_TRANSLATION_LANGUAGE.to_owned()
}

fn default_translation_suffix() -> String {
    DEFAULT_TRANSLATION_SUFFIX.to_owned()
}

fn default_true() -> bool {
    true
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn non_empty_or(value: &str, fallback: impl FnOnce() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: RelnoteConfig) -> RelnoteConfig {
    config.inference.model = normalize_optional(config.inference.model.take());
    config.inference.endpoint = normalize_optional(config.inference.endpoint.take());
    config.inference.api_key_env =
        non_empty_or(&config.inference.api_key_env, default_api_key_env);
    if config.inference.timeout_secs == 0 {
        config.inference.timeout_secs = default_inference_timeout_secs();
    }

    config.source.api_base = non_empty_or(&config.source.api_base, default_github_api_base)
        .trim_end_matches('/')
        .to_owned();
    config.source.token_env = non_empty_or(&config.source.token_env, default_github_token_env);
    config.source.owner = normalize_optional(config.source.owner.take());
    config.source.repo = normalize_optional(config.source.repo.take());
    if config.source.timeout_secs == 0 {
        config.source.timeout_secs = default_source_timeout_secs();
    }

    config.report.output_dir = non_empty_or(&config.report.output_dir, default_output_dir);
    config.report.language = non_empty_or(&config.report.language, default_report_language);
    config.report.good_first_issue_label = non_empty_or(
        &config.report.good_first_issue_label,
        default_good_first_issue_label,
    );

    config.translation.target_language = non_empty_or(
        &config.translation.target_language,
        default_translation_language,
    );
    config.translation.file_suffix =
        non_empty_or(&config.translation.file_suffix, default_translation_suffix);

    config
}
