use std::env;
use anyhow::{Context, ensure};
use dotenvy::dotenv;
use strum_macros::{Display, EnumString};

use crate::attendance::correlator::DEFAULT_DELAY_BUDGET_SECS;

/// Where attendance windows are kept.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreBackend {
    MySql,
    /// Process memory; windows are lost on restart. For local runs.
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,
    pub rate_proof_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,

    /// Seconds allowed between the selfie and the location of one check-in.
    pub selfie_location_delay_secs: i64,
    pub attendance_store: StoreBackend,

    // Bootstrap HR account, created on startup when missing
    pub super_hr_employee_id: Option<String>,
    pub super_hr_name: Option<String>,
    pub super_hr_password: Option<String>,
}

fn parsed<T: std::str::FromStr>(key: &str, default: &str) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a number"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", "900"), // default 15 min
            refresh_token_ttl: parsed("REFRESH_TOKEN_TTL", "604800"), // default 7 days

            rate_login_per_min: parsed("RATE_LOGIN_PER_MIN", "60"),
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", "1000"),
            rate_proof_per_min: parsed("RATE_PROOF_PER_MIN", "30"),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            selfie_location_delay_secs: parsed(
                "SELFIE_LOCATION_DELAY_SECS",
                &DEFAULT_DELAY_BUDGET_SECS.to_string(),
            ),
            attendance_store: env::var("ATTENDANCE_STORE")
                .unwrap_or_else(|_| StoreBackend::MySql.to_string())
                .parse()
                .unwrap_or_else(|_| panic!("ATTENDANCE_STORE must be mysql or memory")),

            super_hr_employee_id: optional("SUPER_HR_EMP_ID"),
            super_hr_name: optional("SUPER_HR_NAME"),
            super_hr_password: optional("SUPER_HR_PWD"),
        }
    }

    pub fn delay_budget(&self) -> anyhow::Result<chrono::Duration> {
        delay_budget_from_secs(self.selfie_location_delay_secs)
    }
}

fn delay_budget_from_secs(secs: i64) -> anyhow::Result<chrono::Duration> {
    ensure!(
        secs >= 0,
        "SELFIE_LOCATION_DELAY_SECS must not be negative, got {secs}"
    );
    chrono::Duration::try_seconds(secs)
        .with_context(|| format!("SELFIE_LOCATION_DELAY_SECS is too large: {secs}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn delay_budget_must_be_a_non_negative_duration() {
        assert_eq!(
            delay_budget_from_secs(60).unwrap(),
            chrono::Duration::seconds(60)
        );
        assert_eq!(delay_budget_from_secs(0).unwrap(), chrono::Duration::zero());

        let err = delay_budget_from_secs(-1).unwrap_err();
        assert!(err.to_string().contains("must not be negative"));

        let err = delay_budget_from_secs(i64::MAX).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn store_backend_parses_case_insensitively() {
        assert_eq!(StoreBackend::from_str("memory").unwrap(), StoreBackend::Memory);
        assert_eq!(StoreBackend::from_str("MySQL").unwrap(), StoreBackend::MySql);
        assert_eq!(StoreBackend::MySql.to_string(), "mysql");
        assert!(StoreBackend::from_str("redis").is_err());
    }
}
