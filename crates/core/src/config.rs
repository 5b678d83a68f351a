use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub usage: UsageConfig,
    pub logging: LoggingConfig,
}

/// Model endpoint settings, passed explicitly to the HTTP client.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: Option<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub stages_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct UsageConfig {
    pub cost_per_million_tokens: f64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub stages_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "qwen3:1.7b";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                timeout_secs: 300,
                max_retries: 2,
                temperature: None,
            },
            pipeline: PipelineConfig::default(),
            usage: UsageConfig { cost_per_million_tokens: 0.150 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => DEFAULT_OPENAI_BASE_URL,
            Self::Ollama => DEFAULT_OLLAMA_BASE_URL,
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("planner.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.set_provider(provider);
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = Some(temperature);
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(stages_path) = pipeline.stages_path {
                self.pipeline.stages_path = Some(stages_path);
            }
        }

        if let Some(usage) = patch.usage {
            if let Some(cost) = usage.cost_per_million_tokens {
                self.usage.cost_per_million_tokens = cost;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PLANNER_LLM_PROVIDER") {
            self.set_provider(value.parse()?);
        }

        let api_key = read_env("PLANNER_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        let base_url = read_env("PLANNER_LLM_BASE_URL").or_else(|| read_env("OPENAI_API_BASE"));
        if let Some(value) = base_url {
            self.llm.base_url = value;
        }
        let model = read_env("PLANNER_LLM_MODEL").or_else(|| read_env("OPENAI_MODEL_NAME"));
        if let Some(value) = model {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PLANNER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PLANNER_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PLANNER_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PLANNER_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("PLANNER_LLM_TEMPERATURE") {
            self.llm.temperature = Some(parse_f32("PLANNER_LLM_TEMPERATURE", &value)?);
        }

        if let Some(value) = read_env("PLANNER_STAGES_PATH") {
            self.pipeline.stages_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("PLANNER_COST_PER_MILLION_TOKENS") {
            self.usage.cost_per_million_tokens =
                parse_f64("PLANNER_COST_PER_MILLION_TOKENS", &value)?;
        }

        let log_level =
            read_env("PLANNER_LOGGING_LEVEL").or_else(|| read_env("PLANNER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PLANNER_LOGGING_FORMAT").or_else(|| read_env("PLANNER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.set_provider(llm_provider);
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(stages_path) = overrides.stages_path {
            self.pipeline.stages_path = Some(stages_path);
        }
    }

    /// Switching provider moves the base url along with it unless the url was
    /// set explicitly to something other than the previous provider's default.
    fn set_provider(&mut self, provider: LlmProvider) {
        if self.llm.base_url == self.llm.provider.default_base_url() {
            self.llm.base_url = provider.default_base_url().to_string();
        }
        self.llm.provider = provider;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_pipeline(&self.pipeline)?;
        validate_usage(&self.usage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("planner.toml"), PathBuf::from("config/planner.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(temperature) = llm.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Validation(
                "llm.temperature must be in range 0.0..=2.0".to_string(),
            ));
        }
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if let Some(path) = &pipeline.stages_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "pipeline.stages_path `{}` does not exist",
                path.display()
            )));
        }
    }
    Ok(())
}

fn validate_usage(usage: &UsageConfig) -> Result<(), ConfigError> {
    let cost = usage.cost_per_million_tokens;
    if !cost.is_finite() || cost < 0.0 {
        return Err(ConfigError::Validation(
            "usage.cost_per_million_tokens must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    pipeline: Option<PipelinePatch>,
    usage: Option<UsagePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    stages_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct UsagePatch {
    cost_per_million_tokens: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        DEFAULT_OPENAI_BASE_URL,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const PLANNER_VARS: [&str; 16] = [
        "PLANNER_LLM_PROVIDER",
        "PLANNER_LLM_API_KEY",
        "PLANNER_LLM_BASE_URL",
        "PLANNER_LLM_MODEL",
        "PLANNER_LLM_TIMEOUT_SECS",
        "PLANNER_LLM_MAX_RETRIES",
        "PLANNER_LLM_TEMPERATURE",
        "PLANNER_STAGES_PATH",
        "PLANNER_COST_PER_MILLION_TOKENS",
        "PLANNER_LOGGING_LEVEL",
        "PLANNER_LOGGING_FORMAT",
        "PLANNER_LOG_LEVEL",
        "PLANNER_LOG_FORMAT",
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "OPENAI_MODEL_NAME",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_target_local_ollama() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);

        let config = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does-not-exist.toml")),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Ollama, "default provider should be ollama")?;
        ensure(config.llm.base_url == "http://localhost:11434/v1", "default base url is ollama")?;
        ensure(config.llm.model == "qwen3:1.7b", "default model should be qwen3:1.7b")?;
        ensure(config.llm.api_key.is_none(), "no api key by default")?;
        ensure(config.usage.cost_per_million_tokens == 0.150, "default cost is 0.150")?;
        ensure(config.pipeline.stages_path.is_none(), "builtin stages by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("TEST_PLANNER_MODEL", "llama3.1:8b");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("planner.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "${TEST_PLANNER_MODEL}"
temperature = 0.3

[usage]
cost_per_million_tokens = 0.5
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "llama3.1:8b", "model should be interpolated from env")?;
            ensure(config.llm.temperature == Some(0.3), "temperature should come from file")?;
            ensure(config.usage.cost_per_million_tokens == 0.5, "cost should come from file")
        })();

        clear_vars(&["TEST_PLANNER_MODEL"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("PLANNER_LLM_MODEL", "model-from-env");
        env::set_var("PLANNER_LOG_LEVEL", "warn");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("planner.toml");
            fs::write(
                &path,
                r#"
[llm]
model = "model-from-file"
timeout_secs = 90

[logging]
level = "error"
format = "json"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.llm.timeout_secs == 90, "file timeout should win over default")?;
            ensure(config.logging.level == "debug", "override log level should win over env")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "file format should apply")
        })();

        clear_vars(&PLANNER_VARS);
        result
    }

    #[test]
    fn conventional_openai_variables_are_read_as_fallbacks() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("OPENAI_API_BASE", "http://gpu-box:11434/v1");
        env::set_var("OPENAI_MODEL_NAME", "qwen3:8b");
        env::set_var("PLANNER_LLM_MODEL", "qwen3:14b");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(PathBuf::from("does-not-exist.toml")),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.base_url == "http://gpu-box:11434/v1", "OPENAI_API_BASE applies")?;
            ensure(config.llm.model == "qwen3:14b", "PLANNER_LLM_MODEL wins over the alias")?;
            ensure(
                env::var("OPENAI_API_KEY").is_err(),
                "loading config must not write environment variables",
            )
        })();

        clear_vars(&PLANNER_VARS);
        result
    }

    #[test]
    fn openai_provider_switches_default_url_and_requires_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("PLANNER_LLM_PROVIDER", "openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                config_path: Some(PathBuf::from("does-not-exist.toml")),
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected validation failure without api key".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("llm.api_key")),
                "validation failure should mention llm.api_key",
            )?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(PathBuf::from("does-not-exist.toml")),
                overrides: ConfigOverrides {
                    llm_api_key: Some("sk-test".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.llm.base_url == DEFAULT_OPENAI_BASE_URL, "openai default url applies")
        })();

        clear_vars(&PLANNER_VARS);
        result
    }

    #[test]
    fn invalid_numeric_override_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("PLANNER_LLM_TIMEOUT_SECS", "soon");

        let result = match AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does-not-exist.toml")),
            ..LoadOptions::default()
        }) {
            Ok(_) => Err("expected invalid override failure".to_string()),
            Err(error) => ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "PLANNER_LLM_TIMEOUT_SECS"),
                "error should name the offending variable",
            ),
        };

        clear_vars(&PLANNER_VARS);
        result
    }

    #[test]
    fn remaining_env_overrides_apply_and_logging_names_win_over_short_aliases(
    ) -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("PLANNER_LLM_MAX_RETRIES", "5");
        env::set_var("PLANNER_LLM_TEMPERATURE", "0.7");
        env::set_var("PLANNER_COST_PER_MILLION_TOKENS", "1.25");
        env::set_var("PLANNER_LOGGING_LEVEL", "debug");
        env::set_var("PLANNER_LOG_LEVEL", "error");
        env::set_var("PLANNER_LOGGING_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(PathBuf::from("does-not-exist.toml")),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.max_retries == 5, "max retries should come from env")?;
            ensure(config.llm.temperature == Some(0.7), "temperature should come from env")?;
            ensure(config.usage.cost_per_million_tokens == 1.25, "cost should come from env")?;
            ensure(config.logging.level == "debug", "PLANNER_LOGGING_LEVEL wins over alias")?;
            ensure(config.logging.format == LogFormat::Pretty, "format should come from env")
        })();

        clear_vars(&PLANNER_VARS);
        result
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("missing/planner.toml")),
            require_file: true,
            ..LoadOptions::default()
        });
        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should fail",
        )
    }

    #[test]
    fn api_key_is_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&PLANNER_VARS);
        env::set_var("PLANNER_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(PathBuf::from("does-not-exist.toml")),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-secret-value")
                    == Some(true),
                "api key should be loaded from env",
            )
        })();

        clear_vars(&PLANNER_VARS);
        result
    }
}
