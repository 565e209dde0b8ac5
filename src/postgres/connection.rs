// ABOUTME: Opens tokio-postgres clients with the process-wide TLS policy
// ABOUTME: Applies a connect timeout and retries the initial connect with backoff

use crate::utils::{retry_with_backoff, strip_password_from_url, validate_connection_string};
use anyhow::{Context, Result};
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_postgres::Client;

static ALLOW_SELF_SIGNED_CERTS: OnceLock<bool> = OnceLock::new();

/// Set the TLS policy once at startup. Later calls are ignored.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    if ALLOW_SELF_SIGNED_CERTS.set(allow_self_signed_certs).is_err() {
        tracing::debug!("TLS policy already initialized, keeping existing value");
    }
    if allow_self_signed_certs {
        tracing::warn!("Accepting self-signed TLS certificates (insecure - use only for testing)");
    }
}

fn allow_self_signed_certs() -> bool {
    ALLOW_SELF_SIGNED_CERTS.get().copied().unwrap_or(false)
}

/// Connection establishment settings
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Applied unless the URL carries its own `connect_timeout`
    pub connect_timeout: Duration,
    /// Extra attempts after the first failed connect
    pub retries: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1800),
            retries: 3,
        }
    }
}

fn build_tls_connector() -> Result<MakeTlsConnector> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(allow_self_signed_certs())
        .build()
        .context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect once with default options.
pub async fn connect(url: &str) -> Result<Client> {
    connect_with_options(url, &ConnectOptions::default()).await
}

/// Connect once, spawning the connection driver onto the runtime.
pub async fn connect_with_options(url: &str, options: &ConnectOptions) -> Result<Client> {
    validate_connection_string(url)?;
    let display_url = strip_password_from_url(url);

    let mut config: tokio_postgres::Config = url
        .parse()
        .with_context(|| format!("Failed to parse connection string {}", display_url))?;
    if config.get_connect_timeout().is_none() {
        config.connect_timeout(options.connect_timeout);
    }

    let tls = build_tls_connector()?;
    let (client, connection) = config
        .connect(tls)
        .await
        .with_context(|| format!("Failed to connect to {}", display_url))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    tracing::debug!("Connected to {}", display_url);
    Ok(client)
}

/// Connect with exponential backoff starting at one second.
pub async fn connect_with_retry(url: &str, options: &ConnectOptions) -> Result<Client> {
    retry_with_backoff(
        || connect_with_options(url, options),
        options.retries,
        Duration::from_secs(1),
    )
    .await
    .with_context(|| {
        format!(
            "Giving up on {} after {} attempt(s)",
            strip_password_from_url(url),
            options.retries + 1
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ConnectOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(1800));
        assert_eq!(options.retries, 3);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url_without_retrying() {
        let options = ConnectOptions {
            connect_timeout: Duration::from_secs(1),
            retries: 0,
        };
        let err = connect_with_retry("mysql://user@localhost/db", &options)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid connection string format"));
    }
}
