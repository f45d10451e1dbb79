use crate::constants::{
    DEFAULT_IO_TIMEOUT_SECS, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_NAME_MAX_LENGTH,
    DEFAULT_NAME_MIN_LENGTH, DEFAULT_PORT, DEFAULT_RATE_LIMIT_BURST,
};
use crate::names::NameAllocator;
use anyhow::Context;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(format!("Invalid scheme: {} (expected http or https)", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub name_min_length: usize,
    pub name_max_length: usize,
    pub max_payload_size: usize,
    pub scheme: Scheme,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    /// Host (and optional port) placed in returned URLs instead of the Host header
    pub public_host: Option<String>,
    pub run_as_user: Option<String>,
    pub io_timeout: Duration,
    pub rate_limit_per_second: Option<u64>,
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("./localpaste_data"),
            name_min_length: DEFAULT_NAME_MIN_LENGTH,
            name_max_length: DEFAULT_NAME_MAX_LENGTH,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            scheme: Scheme::Http,
            tls_cert_path: None,
            tls_key_path: None,
            public_host: None,
            run_as_user: None,
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            rate_limit_per_second: None,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            listen_addr: env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0".to_string())
                .parse()
                .context("LISTEN_ADDR must be an IP address")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .context("PORT must be a port number")?,
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "./localpaste_data".to_string())
                .into(),
            name_min_length: env::var("NAME_MIN_LENGTH")
                .unwrap_or_else(|_| DEFAULT_NAME_MIN_LENGTH.to_string())
                .parse()
                .context("NAME_MIN_LENGTH must be an integer")?,
            name_max_length: env::var("NAME_MAX_LENGTH")
                .unwrap_or_else(|_| DEFAULT_NAME_MAX_LENGTH.to_string())
                .parse()
                .context("NAME_MAX_LENGTH must be an integer")?,
            max_payload_size: env::var("MAX_PAYLOAD_SIZE")
                .unwrap_or_else(|_| DEFAULT_MAX_PAYLOAD_SIZE.to_string())
                .parse()
                .context("MAX_PAYLOAD_SIZE must be a byte count")?,
            scheme: env::var("SCHEME")
                .unwrap_or_else(|_| "http".to_string())
                .parse()
                .map_err(anyhow::Error::msg)?,
            tls_cert_path: env::var("TLS_CERT_PATH").ok().map(PathBuf::from),
            tls_key_path: env::var("TLS_KEY_PATH").ok().map(PathBuf::from),
            public_host: env::var("PUBLIC_HOST").ok().filter(|h| !h.is_empty()),
            run_as_user: env::var("RUN_AS_USER").ok().filter(|u| !u.is_empty()),
            io_timeout: Duration::from_secs(
                env::var("IO_TIMEOUT_SECS")
                    .unwrap_or_else(|_| DEFAULT_IO_TIMEOUT_SECS.to_string())
                    .parse()
                    .context("IO_TIMEOUT_SECS must be an integer")?,
            ),
            rate_limit_per_second: env::var("RATE_LIMIT_PER_SECOND")
                .ok()
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("RATE_LIMIT_PER_SECOND must be an integer")?,
            rate_limit_burst: env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| DEFAULT_RATE_LIMIT_BURST.to_string())
                .parse()
                .context("RATE_LIMIT_BURST must be an integer")?,
        })
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        NameAllocator::new(self.name_min_length, self.name_max_length)?;

        if self.max_payload_size == 0 {
            anyhow::bail!("MAX_PAYLOAD_SIZE must be greater than zero");
        }
        if self.io_timeout.is_zero() {
            anyhow::bail!("IO_TIMEOUT_SECS must be greater than zero");
        }
        if self.rate_limit_per_second == Some(0) || self.rate_limit_burst == 0 {
            anyhow::bail!("rate limit values must be greater than zero");
        }

        match (&self.tls_cert_path, &self.tls_key_path) {
            (None, None) => {}
            (Some(cert), Some(key)) => {
                for path in [cert, key] {
                    if !path.is_file() {
                        anyhow::bail!("TLS file not found: {}", path.display());
                    }
                }
            }
            _ => anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together"),
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.port)
    }

    /// TLS is terminated locally whenever a certificate is configured; the
    /// scheme only affects returned URLs.
    pub fn tls_enabled(&self) -> bool {
        self.tls_cert_path.is_some()
    }
}
