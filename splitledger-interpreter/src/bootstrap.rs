use splitledger_application::{LedgerServiceConfig, config::DEFAULT_MAX_STALE_RETRIES};
use splitledger_domain::MemberId;
use std::env;
use tracing_subscriber::EnvFilter;

pub const MAX_STALE_RETRIES_VAR: &str = "SPLITLEDGER_MAX_STALE_RETRIES";
pub const CONFIRMED_BY_VAR: &str = "SPLITLEDGER_CONFIRMED_BY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be an unsigned integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Interpreter settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub max_stale_retries: u32,
    /// Actor recorded on confirmations; the debtor of each transfer when unset.
    pub confirmed_by: Option<MemberId>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_stale_retries = match lookup(MAX_STALE_RETRIES_VAR) {
            Some(value) => parse_number(MAX_STALE_RETRIES_VAR, &value)?,
            None => DEFAULT_MAX_STALE_RETRIES,
        };
        let confirmed_by = lookup(CONFIRMED_BY_VAR)
            .map(|value| parse_number(CONFIRMED_BY_VAR, &value).map(MemberId))
            .transpose()?;

        Ok(Self {
            max_stale_retries,
            confirmed_by,
        })
    }

    pub fn service_config(&self) -> LedgerServiceConfig {
        LedgerServiceConfig {
            max_stale_retries: self.max_stale_retries,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.to_owned(),
        })
}

/// Logs go to stderr so stdout carries only script output.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(
            AppConfig::from_lookup(lookup(&[])),
            Ok(AppConfig {
                max_stale_retries: DEFAULT_MAX_STALE_RETRIES,
                confirmed_by: None,
            })
        );
    }

    #[test]
    fn values_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            (MAX_STALE_RETRIES_VAR, "5"),
            (CONFIRMED_BY_VAR, " 42 "),
        ]))
        .expect("valid config");
        assert_eq!(config.max_stale_retries, 5);
        assert_eq!(config.confirmed_by, Some(MemberId(42)));
        assert_eq!(config.service_config().max_stale_retries, 5);
    }

    #[rstest]
    #[case::negative_retries(MAX_STALE_RETRIES_VAR, "-1")]
    #[case::text_retries(MAX_STALE_RETRIES_VAR, "many")]
    #[case::mention_actor(CONFIRMED_BY_VAR, "<@1>")]
    fn invalid_values_are_errors(#[case] name: &'static str, #[case] value: &str) {
        assert_eq!(
            AppConfig::from_lookup(lookup(&[(name, value)])),
            Err(ConfigError::InvalidNumber {
                name,
                value: value.to_owned(),
            })
        );
    }
}
