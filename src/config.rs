use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database connection URL; absent means in-memory-only operation
    pub database_url: Option<String>,
    /// Maximum database connections in pool
    pub database_max_connections: u32,
    /// Accepted clock skew for payment proof timestamps, in seconds (default: 300)
    pub payment_skew_secs: i64,
    /// Booking reservation TTL in seconds (default: 3600 = 1 hour)
    pub booking_ttl_secs: i64,
    /// Heartbeat age after which a dynamic agent is considered stale (default: 600)
    pub heartbeat_stale_secs: i64,
    /// Interval between background sweep runs, in seconds (default: 60)
    pub sweep_interval_secs: u64,
    /// EVM address payments are directed to
    pub evm_pay_to: String,
    /// Solana address payments are directed to
    pub solana_pay_to: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let payment_skew_secs = env::var("PAYMENT_SKEW_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PAYMENT_SKEW_SECS"))?;

        let booking_ttl_secs = env::var("BOOKING_TTL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("BOOKING_TTL_SECS"))?;

        let heartbeat_stale_secs = env::var("HEARTBEAT_STALE_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("HEARTBEAT_STALE_SECS"))?;

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SWEEP_INTERVAL_SECS"))?;

        let evm_pay_to = env::var("EVM_PAY_TO")
            .unwrap_or_else(|_| "0x1f9090aae28b8a3dceadf281b0f12828e676c326".to_string());

        let solana_pay_to = env::var("SOLANA_PAY_TO")
            .unwrap_or_else(|_| "9u4eVWRf8a7vMDCHsguakB6vxcnCuJssBVBbQAYrKdog".to_string());

        Ok(Self {
            host,
            port,
            database_url,
            database_max_connections,
            payment_skew_secs,
            booking_ttl_secs,
            heartbeat_stale_secs,
            sweep_interval_secs,
            evm_pay_to,
            solana_pay_to,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: None,
            database_max_connections: 10,
            payment_skew_secs: 300,
            booking_ttl_secs: 3600,
            heartbeat_stale_secs: 600,
            sweep_interval_secs: 60,
            evm_pay_to: "0x1f9090aae28b8a3dceadf281b0f12828e676c326".to_string(),
            solana_pay_to: "9u4eVWRf8a7vMDCHsguakB6vxcnCuJssBVBbQAYrKdog".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
