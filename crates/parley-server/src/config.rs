use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Server settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub long_poll_timeout: Duration,
    pub online_window: Duration,
    pub admin: Option<AdminAccount>,
}

/// Account created with admin rights at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccount")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let long_poll_timeout = seconds(get("PARLEY_LONG_POLL_TIMEOUT_SECS"), 25)
            .context("PARLEY_LONG_POLL_TIMEOUT_SECS must be a whole number of seconds")?;
        let online_window = seconds(get("PARLEY_ONLINE_WINDOW_SECS"), 30)
            .context("PARLEY_ONLINE_WINDOW_SECS must be a whole number of seconds")?;

        let admin = match (get("PARLEY_ADMIN_USERNAME"), get("PARLEY_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminAccount { username, password }),
            (Some(_), None) => bail!("PARLEY_ADMIN_PASSWORD is required when PARLEY_ADMIN_USERNAME is set"),
            (None, _) => None,
        };

        Ok(Self {
            host,
            port,
            long_poll_timeout,
            online_window,
            admin,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn seconds(value: Option<String>, default: u64) -> Result<Duration> {
    let secs = match value {
        Some(v) => v.parse()?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}
