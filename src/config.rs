use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "missing credentials: set RESULTADOS_USERNAME and RESULTADOS_PASSWORD, or RESULTADOS_TOKEN"
    )]
    MissingCredentials,
}

/// Runtime configuration, read once at startup from environment variables
/// (a .env file is honored when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub interval_seconds: u64,
    pub pba_id: String,
    pub pba_name: String,
    pub csv_path: PathBuf,
    pub fotos_base_path: String,
    pub fotos_default_file: String,
    pub fotos_json_path: String,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env_nonempty("RESULTADOS_TOKEN");
        let username = env_nonempty("RESULTADOS_USERNAME");
        let password = env_nonempty("RESULTADOS_PASSWORD");
        if token.is_none() && (username.is_none() || password.is_none()) {
            return Err(ConfigError::MissingCredentials);
        }

        let base_url = env_or("RESULTADOS_BASE_URL", "https://api.resultados.gob.ar/api")
            .trim_end_matches('/')
            .to_string();
        let interval_seconds = env::var("RESULTADOS_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30)
            .max(1);

        Ok(Self {
            base_url,
            token,
            username,
            password,
            interval_seconds,
            pba_id: env_or("RESULTADOS_PBA_ID", "02"),
            pba_name: env_or("RESULTADOS_PBA_NAME", "Provincia de Buenos Aires"),
            csv_path: PathBuf::from(env_or("RESULTADOS_CSV_PATH", "elecciones_datos.csv")),
            fotos_base_path: env_or("FOTOS_BASE_PATH", ""),
            fotos_default_file: env_or("FOTOS_DEFAULT_FILE", "N/A"),
            fotos_json_path: env_or("FOTOS_JSON_PATH", ""),
        })
    }
}
