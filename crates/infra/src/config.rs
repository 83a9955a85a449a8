//! Configuration loading and representation.
//!
//! Values come from environment variables. Loading goes through a lookup
//! closure so tests never touch the process environment.

use std::net::SocketAddr;

use thiserror::Error;

use videostore_rentals::LoanPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a socket address like 0.0.0.0:8080 (got '{value}')")]
    InvalidBindAddr { name: &'static str, value: String },

    #[error("{name} must be a whole number of days, at least 1 (got '{value}')")]
    InvalidLoanPeriod { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub loan_policy: LoanPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidBindAddr {
                    name: "BIND_ADDR",
                    value: raw.clone(),
                })?,
            None => default_bind_addr(),
        };

        let loan_policy = match lookup("LOAN_PERIOD_DAYS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(|days| LoanPolicy::new(days).ok())
                .ok_or_else(|| ConfigError::InvalidLoanPeriod {
                    name: "LOAN_PERIOD_DAYS",
                    value: raw.clone(),
                })?,
            None => LoanPolicy::default(),
        };

        Ok(Self {
            bind_addr,
            loan_policy,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            loan_policy: LoanPolicy::default(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
