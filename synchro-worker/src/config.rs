/// Worker configuration
///
/// Loaded from environment variables (a `.env` file is honored in
/// development):
///
/// - `STORE_URL` (required): base URL of the document store
/// - `STORE_API_KEY`: bearer token for the store
/// - `EMAIL_API_URL`: transactional email endpoint; when unset the
///   worker logs emails instead of sending them
/// - `EMAIL_API_KEY`: bearer token for the email API
/// - `EMAIL_FROM`: sender address (default `notifications@synchro.app`)
/// - `DISPATCH_POLL_SECS`: outbox poll interval (default 5)
/// - `DISPATCH_BATCH_SIZE`: records per cycle (default 20)
/// - `DISPATCH_MAX_ATTEMPTS`: attempts before parking (default 5)
/// - `RECONCILE_INTERVAL_SECS`: sweep interval (default 60)

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::dispatcher::DispatcherConfig;

/// Complete worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub store_url: String,
    pub store_api_key: Option<String>,
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub dispatcher: DispatcherConfig,
    pub reconcile_interval: Duration,
}

impl WorkerConfig {
    /// Loads configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let store_url = env::var("STORE_URL").context("STORE_URL must be set")?;

        Ok(WorkerConfig {
            store_url,
            store_api_key: env::var("STORE_API_KEY").ok(),
            email_api_url: env::var("EMAIL_API_URL").ok(),
            email_api_key: env::var("EMAIL_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "notifications@synchro.app".to_string()),
            dispatcher: DispatcherConfig {
                poll_interval: Duration::from_secs(parse_env("DISPATCH_POLL_SECS", 5)?),
                batch_size: parse_env("DISPATCH_BATCH_SIZE", 20)?,
                max_attempts: parse_env("DISPATCH_MAX_ATTEMPTS", 5)?,
            },
            reconcile_interval: Duration::from_secs(parse_env("RECONCILE_INTERVAL_SECS", 60)?),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a number, got {:?}", key, value)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them to pure parsing.
    #[test]
    fn test_parse_env_default_when_unset() {
        let value: u64 = parse_env("SYNCHRO_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
