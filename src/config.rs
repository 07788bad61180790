use std::env;

use anyhow::{Context, anyhow};

use crate::queue::NumberingMode;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub db_max_connections: u32,
    pub queue_numbering: NumberingMode,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| anyhow!("SESSION_TTL_HOURS must be a positive integer, got {raw:?}"))?,
            None => 24,
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}"))?,
            None => 10,
        };

        let queue_numbering = match lookup("QUEUE_NUMBERING") {
            Some(raw) => raw.parse::<NumberingMode>().map_err(|e| anyhow!(e))?,
            None => NumberingMode::default(),
        };

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            db_max_connections,
            queue_numbering,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg = load(&[("DATABASE_URL", "postgres://clinic@localhost/clinic")]).unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.session_ttl_hours, 24);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.queue_numbering, NumberingMode::Serialized);
    }

    #[test]
    fn database_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn reads_overrides() {
        let cfg = load(&[
            ("DATABASE_URL", "postgres://db/clinic"),
            ("BIND_ADDR", "0.0.0.0:3001"),
            ("SESSION_TTL_HOURS", "12"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("QUEUE_NUMBERING", "unguarded"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.session_ttl_hours, 12);
        assert_eq!(cfg.db_max_connections, 4);
        assert_eq!(cfg.queue_numbering, NumberingMode::Unguarded);
    }

    #[test]
    fn rejects_bad_values_instead_of_defaulting() {
        let base = ("DATABASE_URL", "postgres://db/clinic");

        assert!(load(&[base, ("SESSION_TTL_HOURS", "soon")]).is_err());
        assert!(load(&[base, ("SESSION_TTL_HOURS", "0")]).is_err());
        assert!(load(&[base, ("DB_MAX_CONNECTIONS", "-1")]).is_err());

        let err = load(&[base, ("QUEUE_NUMBERING", "optimistic")]).unwrap_err();
        assert!(err.to_string().contains("optimistic"));
    }
}
