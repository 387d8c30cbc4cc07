use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing env {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where result tables go, picked by `WAREHOUSE_KIND`.
#[derive(Clone, Debug, PartialEq)]
pub enum WarehouseConfig {
    Csv {
        dir: PathBuf,
    },
    Rest {
        url: String,
        token: Option<String>,
        timeout_secs: u64,
    },
}

impl WarehouseConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            WarehouseConfig::Csv { .. } => "csv",
            WarehouseConfig::Rest { .. } => "rest",
        }
    }
}

/// Worker settings read from the environment (and `.env`, loaded by the binary).
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub dataset: String,
    pub warehouse: WarehouseConfig,
    pub engine_url: Option<String>,
    pub engine_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_max_connections = parse_or(&get, "DB_MAX_CONNECTIONS", 10u32)?;
        let engine_timeout_secs = parse_or(&get, "ENGINE_TIMEOUT_SECS", 600u64)?;

        let warehouse_kind = get("WAREHOUSE_KIND")
            .unwrap_or_else(|| "csv".to_string())
            .to_lowercase();
        let warehouse = match warehouse_kind.as_str() {
            "csv" => WarehouseConfig::Csv {
                dir: PathBuf::from(get("WAREHOUSE_DIR").unwrap_or_else(|| "warehouse".to_string())),
            },
            "rest" => WarehouseConfig::Rest {
                url: get("WAREHOUSE_URL").ok_or(ConfigError::MissingEnv("WAREHOUSE_URL"))?,
                token: get("WAREHOUSE_TOKEN"),
                timeout_secs: parse_or(&get, "WAREHOUSE_TIMEOUT_SECS", 60u64)?,
            },
            _ => {
                return Err(ConfigError::Invalid {
                    name: "WAREHOUSE_KIND",
                    value: warehouse_kind.clone(),
                })
            }
        };

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://backtests.db?mode=rwc".to_string()),
            db_max_connections,
            dataset: get("WAREHOUSE_DATASET").unwrap_or_else(|| "backtests".to_string()),
            warehouse,
            engine_url: get("ENGINE_URL"),
            engine_timeout_secs,
        })
    }

    pub fn require_engine_url(&self) -> Result<&str, ConfigError> {
        self.engine_url
            .as_deref()
            .ok_or(ConfigError::MissingEnv("ENGINE_URL"))
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
