use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't have to
    /// touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("ASSEMBLE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ASSEMBLE_JWT_SECRET is unset or still a placeholder");
        }

        let db_path: PathBuf = lookup("ASSEMBLE_DB_PATH")
            .unwrap_or_else(|| "assemble.db".into())
            .into();
        let host = lookup("ASSEMBLE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("ASSEMBLE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("ASSEMBLE_PORT must be a port number")?;
        let token_days: i64 = lookup("ASSEMBLE_TOKEN_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("ASSEMBLE_TOKEN_DAYS must be a whole number of days")?;
        if token_days <= 0 {
            bail!("ASSEMBLE_TOKEN_DAYS must be positive");
        }

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl: chrono::Duration::days(token_days),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("ASSEMBLE_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("assemble.db"));
        assert_eq!(config.addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.token_ttl, chrono::Duration::days(30));
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(
            Config::from_lookup(lookup(&[("ASSEMBLE_JWT_SECRET", "dev-secret-change-me")])).is_err()
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("ASSEMBLE_JWT_SECRET", "s3cret"),
            ("ASSEMBLE_DB_PATH", "/var/lib/assemble/data.db"),
            ("ASSEMBLE_HOST", "127.0.0.1"),
            ("ASSEMBLE_PORT", "8080"),
            ("ASSEMBLE_TOKEN_DAYS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_path, PathBuf::from("/var/lib/assemble/data.db"));
        assert_eq!(config.token_ttl, chrono::Duration::days(7));
    }

    #[test]
    fn bad_numbers_are_errors() {
        let secret = ("ASSEMBLE_JWT_SECRET", "s3cret");
        assert!(Config::from_lookup(lookup(&[secret, ("ASSEMBLE_PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[secret, ("ASSEMBLE_TOKEN_DAYS", "0")])).is_err());
    }
}
