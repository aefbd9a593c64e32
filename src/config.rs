use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

/// Integrity thresholds are policy, not mechanism: they come from the
/// environment so deployments can tune them without a rebuild.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityThresholds {
    pub max_tab_switches: i32,
    pub max_copy_paste: i32,
    pub max_disconnections: i32,
}

impl Default for IntegrityThresholds {
    fn default() -> Self {
        Self {
            max_tab_switches: 5,
            max_copy_paste: 2,
            max_disconnections: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub public_rps: u32,
    pub operator_rps: u32,
    /// Minimum interval between durable writes of heartbeat time updates.
    pub heartbeat_sync_secs: i64,
    /// Interval of the background sweep that force-expires attempts past
    /// their absolute ceiling.
    pub expiry_sweep_secs: u64,
    pub integrity: IntegrityThresholds,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            public_rps: get_env_or("PUBLIC_RPS", 100)?,
            operator_rps: get_env_or("OPERATOR_RPS", 50)?,
            heartbeat_sync_secs: get_env_or("HEARTBEAT_SYNC_SECS", 30)?,
            expiry_sweep_secs: get_env_or("EXPIRY_SWEEP_SECS", 30)?,
            integrity: IntegrityThresholds {
                max_tab_switches: get_env_or("MAX_TAB_SWITCHES", 5)?,
                max_copy_paste: get_env_or("MAX_COPY_PASTE", 2)?,
                max_disconnections: get_env_or("MAX_DISCONNECTIONS", 3)?,
            },
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
