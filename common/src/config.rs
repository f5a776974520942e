use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_url: String,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    /// Loads the configuration once from `env_path` and the process environment.
    ///
    /// Later calls return the instance built by the first one.
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let config = Self::from_env();

            if let Some(parent) = std::path::Path::new(&config.log_file).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).expect("Failed to create log directory");
                }
            }

            config
        })
    }

    /// Returns the loaded configuration, falling back to the plain environment
    /// when `init` has not been called.
    pub fn get() -> &'static Self {
        CONFIG.get_or_init(Self::from_env)
    }

    fn from_env() -> Self {
        let project_name = env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-core".into());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
        let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/attendance.log".into());
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "data/attendance.db".into());

        Config {
            project_name,
            log_level,
            log_file,
            database_url,
        }
    }
}
