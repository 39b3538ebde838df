use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::Settings;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "timers.db";

/// 应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据库路径，默认放在用户数据目录
    pub db_path: Option<PathBuf>,
    /// 命令行代表的用户
    pub user_id: i64,
    pub log_level: String,
    /// `settings init` 使用的默认设置
    pub defaults: Settings,
    pub daemon: DaemonConfig,
    /// 实际读取的配置文件，使用默认配置时为 None
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// 守护进程配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub poll_interval_secs: u64,
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            user_id: 1,
            log_level: "info".to_string(),
            defaults: Settings::default(),
            daemon: DaemonConfig::default(),
            source: None,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            notifications: true,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "focus-timer", "timers").context("Failed to get project directories")
}

impl Config {
    /// 读取配置文件；未指定路径且默认位置没有文件时使用默认配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = project_dirs()?.config_dir().join(CONFIG_FILE_NAME);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("Invalid config file {:?}", path))?;
        config.source = Some(path);
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    fn validate(&self) -> Result<()> {
        self.defaults.validate().context("Invalid [defaults] section")?;
        if self.daemon.poll_interval_secs == 0 {
            anyhow::bail!("daemon.poll_interval_secs must be greater than 0");
        }
        Ok(())
    }

    /// 数据库路径，必要时创建数据目录
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let proj_dirs = project_dirs()?;
        let data_dir = proj_dirs.data_dir();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
        Ok(data_dir.join(DB_FILE_NAME))
    }
}

/// 初始化日志，RUST_LOG 优先于配置
pub fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
