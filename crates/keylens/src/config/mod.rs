use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub const DEFAULT_DB_FILE: &str = "keyboard_stats.db";
pub const DEFAULT_LLM_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_LLM_MODEL: &str = "llama3";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TRANSLATE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
pub const DEFAULT_DEEPL_ENDPOINT: &str = "https://api-free.deepl.com/v2/translate";
pub const DEFAULT_BIND: &str = "127.0.0.1:5001";

pub const ENV_DB_PATH: &str = "KEYLENS_DB_PATH";
pub const ENV_LLM_ENDPOINT: &str = "KEYLENS_LLM_ENDPOINT";
pub const ENV_LLM_MODEL: &str = "KEYLENS_LLM_MODEL";
pub const ENV_LLM_TIMEOUT_SECS: &str = "KEYLENS_LLM_TIMEOUT_SECS";
pub const ENV_TRANSLATE_TIMEOUT_SECS: &str = "KEYLENS_TRANSLATE_TIMEOUT_SECS";
pub const ENV_DEEPL_API_KEY: &str = "KEYLENS_DEEPL_API_KEY";
pub const ENV_BIND: &str = "KEYLENS_BIND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateConfig {
    pub google_endpoint: String,
    pub deepl_endpoint: String,
    /// DeepL is skipped entirely when no key is configured.
    pub deepl_api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            google_endpoint: DEFAULT_GOOGLE_ENDPOINT.to_string(),
            deepl_endpoint: DEFAULT_DEEPL_ENDPOINT.to_string(),
            deepl_api_key: None,
            timeout: Duration::from_secs(DEFAULT_TRANSLATE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5001)),
        }
    }
}

/// Everything a pipeline component needs, resolved once at startup and
/// passed down by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub llm: LlmConfig,
    pub translate: TranslateConfig,
    pub server: ServerConfig,
}

/// Values supplied on the command line. They win over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub llm_endpoint: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub bind: Option<SocketAddr>,
}

pub fn resolve_app_config(
    env: impl Fn(&str) -> Option<String>,
    home_dir: &Path,
    cwd: &Path,
    overrides: &ConfigOverrides,
) -> Result<AppConfig> {
    if !home_dir.is_absolute() {
        bail!("home_dir must be absolute: {}", home_dir.display());
    }
    if !cwd.is_absolute() {
        bail!("cwd must be absolute: {}", cwd.display());
    }
    let home_dir = normalize_lexical(home_dir);
    let cwd = normalize_lexical(cwd);
    let env_value = |name: &str| env(name).filter(|value| !value.trim().is_empty());

    let db_path = match overrides
        .db_path
        .clone()
        .or_else(|| env_value(ENV_DB_PATH).map(PathBuf::from))
    {
        Some(path) => resolve_user_path(&path, &home_dir, &cwd)?,
        None => cwd.join(DEFAULT_DB_FILE),
    };

    let llm_timeout_secs = match overrides.llm_timeout_secs {
        Some(secs) => secs,
        None => parse_env_secs(ENV_LLM_TIMEOUT_SECS, env_value(ENV_LLM_TIMEOUT_SECS))?
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
    };
    let translate_timeout_secs =
        parse_env_secs(ENV_TRANSLATE_TIMEOUT_SECS, env_value(ENV_TRANSLATE_TIMEOUT_SECS))?
            .unwrap_or(DEFAULT_TRANSLATE_TIMEOUT_SECS);

    let llm = LlmConfig {
        endpoint: overrides
            .llm_endpoint
            .clone()
            .or_else(|| env_value(ENV_LLM_ENDPOINT))
            .unwrap_or_else(|| DEFAULT_LLM_ENDPOINT.to_string()),
        model: overrides
            .llm_model
            .clone()
            .or_else(|| env_value(ENV_LLM_MODEL))
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        timeout: positive_timeout("llm timeout", llm_timeout_secs)?,
    };

    let translate = TranslateConfig {
        deepl_api_key: env_value(ENV_DEEPL_API_KEY),
        timeout: positive_timeout("translate timeout", translate_timeout_secs)?,
        ..TranslateConfig::default()
    };

    let bind = match overrides.bind {
        Some(bind) => bind,
        None => match env_value(ENV_BIND) {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .with_context(|| format!("{ENV_BIND} is not a socket address: {raw}"))?,
            None => ServerConfig::default().bind,
        },
    };

    Ok(AppConfig {
        db_path: normalize_lexical(&db_path),
        llm,
        translate,
        server: ServerConfig { bind },
    })
}

fn parse_env_secs(name: &str, raw: Option<String>) -> Result<Option<u64>> {
    raw.map(|raw| {
        raw.trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a whole number of seconds: {raw}"))
    })
    .transpose()
}

fn positive_timeout(label: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        bail!("{label} must be greater than zero seconds");
    }
    Ok(Duration::from_secs(secs))
}

fn resolve_user_path(path: &Path, home_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(path, home_dir)?;
    let resolved = if expanded.is_absolute() {
        expanded
    } else {
        cwd.join(expanded)
    };

    Ok(normalize_lexical(&resolved))
}

fn expand_tilde(path: &Path, home_dir: &Path) -> Result<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => {
            let mut expanded = home_dir.to_path_buf();
            for component in components {
                expanded.push(component.as_os_str());
            }
            Ok(expanded)
        }
        Some(Component::Normal(first))
            if first
                .to_str()
                .is_some_and(|segment| segment.starts_with('~')) =>
        {
            bail!(
                "unsupported home expansion syntax (only `~` and `~/...` are supported): {}",
                path.display()
            )
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn normalize_lexical(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }

    normalized
}
