use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Postgres,
    Csv,
}

impl DataSource {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(DataSource::Postgres),
            "csv" => Some(DataSource::Csv),
            _ => None,
        }
    }
}

/// How composition snapshots are built when loading CSV data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexConstruction {
    /// `snapshots.csv`, or snapshots derived from the weights in `prices.csv`.
    Snapshots,
    /// The `size` largest constituents by market cap each trading day, weighted 1/N.
    EqualWeight { size: usize },
}

impl IndexConstruction {
    fn parse(value: &str, size: usize) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "snapshots" => Some(IndexConstruction::Snapshots),
            "equal_weight" | "equal-weight" => Some(IndexConstruction::EqualWeight { size }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_source: DataSource,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub data_dir: PathBuf,
    pub index_construction: IndexConstruction,
    pub bind_addr: String,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: i64,
    pub export_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let source_name = std::env::var("DATA_SOURCE").unwrap_or_else(|_| "csv".to_string());
        let data_source = DataSource::parse(&source_name).ok_or_else(|| {
            format!("Invalid DATA_SOURCE: {}. Must be 'postgres' or 'csv'", source_name)
        })?;

        let construction_name =
            std::env::var("INDEX_CONSTRUCTION").unwrap_or_else(|_| "snapshots".to_string());
        let index_construction =
            IndexConstruction::parse(&construction_name, env_or("INDEX_SIZE", 100))
                .ok_or_else(|| {
                    format!(
                        "Invalid INDEX_CONSTRUCTION: {}. Must be 'snapshots' or 'equal_weight'",
                        construction_name
                    )
                })?;

        let config = Self {
            data_source,
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
            run_migrations: env_or("RUN_MIGRATIONS", false),
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            index_construction,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cache_enabled: env_or("CACHE_ENABLED", true),
            cache_ttl_seconds: env_or("CACHE_TTL_SECONDS", 3600),
            export_timeout: Duration::from_secs(env_or("EXPORT_TIMEOUT_SECONDS", 30)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.data_source == DataSource::Postgres && self.database_url.is_none() {
            return Err("DATA_SOURCE is postgres but DATABASE_URL is not set".to_string());
        }
        if self.index_construction == (IndexConstruction::EqualWeight { size: 0 }) {
            return Err("INDEX_SIZE must be positive".to_string());
        }
        if self.cache_ttl_seconds < 0 {
            return Err("CACHE_TTL_SECONDS must not be negative".to_string());
        }
        if self.export_timeout.is_zero() {
            return Err("EXPORT_TIMEOUT_SECONDS must be positive".to_string());
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            data_source: DataSource::Csv,
            database_url: None,
            database_max_connections: 10,
            run_migrations: false,
            data_dir: PathBuf::from("data"),
            index_construction: IndexConstruction::Snapshots,
            bind_addr: "127.0.0.1:3000".to_string(),
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            export_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let config = AppConfig {
            data_source: DataSource::Postgres,
            ..base()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            data_source: DataSource::Postgres,
            database_url: Some("postgres://localhost/index".to_string()),
            ..base()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_source_names() {
        assert_eq!(DataSource::parse("Postgres"), Some(DataSource::Postgres));
        assert_eq!(DataSource::parse("csv"), Some(DataSource::Csv));
        assert_eq!(DataSource::parse("redis"), None);
    }

    #[test]
    fn test_index_construction_names() {
        assert_eq!(
            IndexConstruction::parse("snapshots", 100),
            Some(IndexConstruction::Snapshots)
        );
        assert_eq!(
            IndexConstruction::parse("Equal_Weight", 25),
            Some(IndexConstruction::EqualWeight { size: 25 })
        );
        assert_eq!(IndexConstruction::parse("cap_weight", 100), None);
    }

    #[test]
    fn test_empty_equal_weight_index_rejected() {
        let config = AppConfig {
            index_construction: IndexConstruction::EqualWeight { size: 0 },
            ..base()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_export_timeout_rejected() {
        let config = AppConfig {
            export_timeout: Duration::ZERO,
            ..base()
        };
        assert!(config.validate().is_err());
    }
}
