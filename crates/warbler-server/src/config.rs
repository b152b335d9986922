use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in sample `.env` files and must never sign real sessions.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me", "it's a secret"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Clone)]
pub struct Config {
    pub database: DatabaseLocation,
    pub secret_key: String,
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database", &self.database)
            .field("secret_key", &"<redacted>")
            .field("addr", &self.addr)
            .field("static_dir", &self.static_dir)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = get("DATABASE_URL").unwrap_or_else(|| "sqlite://warbler.db".into());
        let database = parse_database_url(&database_url)?;

        let secret_key = get("WARBLER_SECRET_KEY").unwrap_or_default();
        if secret_key.is_empty() || PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            bail!("WARBLER_SECRET_KEY is unset or still a placeholder; set it in .env and restart");
        }

        let host = get("WARBLER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("WARBLER_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("WARBLER_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let static_dir: PathBuf = get("WARBLER_STATIC_DIR")
            .unwrap_or_else(|| "./static".into())
            .into();

        Ok(Self {
            database,
            secret_key,
            addr,
            static_dir,
        })
    }
}

/// `sqlite://path`, a bare path, or `:memory:`.
pub fn parse_database_url(url: &str) -> anyhow::Result<DatabaseLocation> {
    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    match path {
        "" => bail!("DATABASE_URL has no path"),
        ":memory:" => Ok(DatabaseLocation::Memory),
        _ if path.contains("://") => bail!("unsupported DATABASE_URL scheme: {url}"),
        _ => Ok(DatabaseLocation::File(PathBuf::from(path))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn database_url_forms() {
        assert_eq!(
            parse_database_url("sqlite://warbler.db").unwrap(),
            DatabaseLocation::File("warbler.db".into())
        );
        assert_eq!(
            parse_database_url("/var/lib/warbler.db").unwrap(),
            DatabaseLocation::File("/var/lib/warbler.db".into())
        );
        assert_eq!(parse_database_url("sqlite://:memory:").unwrap(), DatabaseLocation::Memory);
        assert_eq!(parse_database_url(":memory:").unwrap(), DatabaseLocation::Memory);
        assert!(parse_database_url("postgresql:///warbler").is_err());
        assert!(parse_database_url("sqlite://").is_err());
    }

    #[test]
    fn defaults() {
        let cfg = config(&[("WARBLER_SECRET_KEY", "s3cr3t")]).unwrap();
        assert_eq!(cfg.database, DatabaseLocation::File("warbler.db".into()));
        assert_eq!(cfg.addr, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.static_dir, PathBuf::from("./static"));
    }

    #[test]
    fn missing_or_placeholder_secret_is_rejected() {
        assert!(config(&[]).is_err());
        assert!(config(&[("WARBLER_SECRET_KEY", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = config(&[("WARBLER_SECRET_KEY", "s3cr3t"), ("WARBLER_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("WARBLER_PORT"));
    }

    #[test]
    fn debug_output_hides_secret() {
        let cfg = config(&[("WARBLER_SECRET_KEY", "s3cr3t")]).unwrap();
        let printed = format!("{cfg:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("s3cr3t"));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("WARBLER_SECRET_KEY", "s3cr3t"),
            ("DATABASE_URL", ":memory:"),
            ("WARBLER_HOST", "127.0.0.1"),
            ("WARBLER_PORT", "8080"),
            ("WARBLER_STATIC_DIR", "/srv/static"),
        ])
        .unwrap();
        assert_eq!(cfg.database, DatabaseLocation::Memory);
        assert_eq!(cfg.addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.static_dir, PathBuf::from("/srv/static"));
    }
}
