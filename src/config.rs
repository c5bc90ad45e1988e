use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::System;
use thiserror::Error;

use crate::api::{BASE_URL, DEFAULT_TTL};
use crate::resolver::ECHO_URL;

pub const DOMAIN_VAR: &str = "SPACESHIP_DOMAIN";
pub const API_KEY_VAR: &str = "SPACESHIP_API_KEY";
pub const SECRET_VAR: &str = "SPACESHIP_SECRET";

// Internal struct for command-line flags: **not** the whole program configuration. Credentials come from the
// environment and the env file through `Sources`; see `Config::from_args`.
#[derive(Debug, clap::Parser)]
#[command(version, about, max_term_width = 100)]
pub struct Args {
    /// Path to a KEY=value file with the Spaceship domain and API credentials.
    ///
    /// The file is optional. Variables already set in the environment take precedence over the ones in the file.
    #[arg(
        short,
        long,
        env = "SPACESHIP_DDNS_ENV_FILE",
        value_name = "FILE",
        default_value = ".env.spaceship"
    )]
    pub env_file: PathBuf,

    /// Name of the AAAA record to keep updated. Defaults to this machine's hostname.
    #[arg(long, env = "SPACESHIP_DDNS_HOSTNAME", value_name = "NAME")]
    pub hostname: Option<String>,

    /// TTL, in seconds, given to the record when it is created or updated.
    #[arg(
        long,
        env = "SPACESHIP_DDNS_TTL",
        value_name = "SECONDS",
        default_value_t = DEFAULT_TTL,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    pub ttl: u32,

    /// How long to wait on each request before giving up, in seconds.
    #[arg(
        long,
        env = "SPACESHIP_DDNS_TIMEOUT",
        value_name = "SECONDS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub timeout: u64,

    /// Skip creating or modifying the DNS record on Spaceship.
    ///
    /// When this option is enabled, the current IP address and existing records will be fetched and the change that
    /// would be made will be printed, but nothing will actually be written.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Controls the verbosity of logs.
    ///
    /// Possible log levels are 'error', 'warn', 'info', 'debug', and 'trace' (in that order).
    #[arg(long, env = "SPACESHIP_DDNS_LOG_LEVEL", value_name = "LEVEL", default_value = "info")]
    pub log_level: log::LevelFilter,

    /// Leave timestamps out of log lines (useful when the scheduler already adds its own).
    #[arg(long, env = "SPACESHIP_DDNS_LOG_NO_TIMESTAMPS")]
    pub no_timestamps: bool,

    /// Base URL of the Spaceship API.
    #[arg(long, env = "SPACESHIP_API_URL", value_name = "URL", default_value = BASE_URL)]
    pub api_url: String,

    /// URL of a service that replies with the caller's IPv6 address as plain text.
    #[arg(long, env = "SPACESHIP_DDNS_IP_URL", value_name = "URL", default_value = ECHO_URL)]
    pub ip_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting(s): {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[cfg(feature = "dotenv")]
    #[error("failed to read {}", .path.display())]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("could not determine this machine's hostname; pass --hostname instead")]
    NoHostname,

    #[error("hostname {0:?} may not be empty or contain whitespace")]
    InvalidHostname(String),

    #[error("{0} contains characters that cannot be sent in an HTTP header")]
    InvalidHeader(&'static str),
}

/// Main program configuration, fixed for the whole run.
#[derive(Debug)]
pub struct Config {
    pub credentials: Credentials,
    /// Name of the AAAA record to manage.
    pub hostname: String,
    pub ttl: u32,
    pub timeout: Duration,
    /// Fetch the address and records and decide what to do, but don't actually write anything.
    pub dry_run: bool,
    pub api_url: String,
    pub ip_url: String,
}

impl Config {
    /// Loads runtime configuration from command line arguments, the environment, and the env file.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let sources = Sources::load(&args.env_file)?;
        Self::from_sources(args, &sources)
    }

    fn from_sources(args: &Args, sources: &Sources) -> Result<Self, ConfigError> {
        let credentials = sources.credentials()?;

        let hostname = match args.hostname.as_deref() {
            Some(name) => name.to_string(),
            None => System::host_name().ok_or(ConfigError::NoHostname)?,
        };

        if hostname.is_empty() || hostname.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidHostname(hostname));
        }

        Ok(Config {
            credentials,
            hostname,
            ttl: args.ttl,
            timeout: Duration::from_secs(args.timeout),
            dry_run: args.dry_run,
            api_url: args.api_url.clone(),
            ip_url: args.ip_url.clone(),
        })
    }
}

/// Spaceship domain and API credentials.
#[derive(Clone)]
pub struct Credentials {
    domain: String,
    api_key: String,
    secret: String,
}

impl Credentials {
    pub fn new(domain: &str, api_key: &str, secret: &str) -> Self {
        Self {
            domain: domain.to_string(),
            api_key: api_key.to_string(),
            secret: secret.to_string(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

/// Keeps the key and secret out of logs.
impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The two places settings can come from: the process environment, overlaid on top of the env file.
///
/// Both are read once, up front. Nothing is ever written back into the process environment.
#[derive(Debug, Default)]
pub struct Sources {
    env: HashMap<String, String>,
    file: HashMap<String, String>,
}

impl Sources {
    pub fn load(env_file: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            // `env::vars` panics on non-UTF-8 variables; those can't be one of ours anyway, so skip them.
            env: std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
            file: read_env_file(env_file)?,
        })
    }

    /// Looks up a single setting. A variable that is set in the environment wins even if it is empty, and empty values
    /// count as unset.
    fn get(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .or_else(|| self.file.get(key))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Pulls the credentials out of these sources, reporting every missing one at once.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let domain = self.get(DOMAIN_VAR);
        let api_key = self.get(API_KEY_VAR);
        let secret = self.get(SECRET_VAR);

        match (domain, api_key, secret) {
            (Some(domain), Some(api_key), Some(secret)) => Ok(Credentials::new(domain, api_key, secret)),
            _ => {
                let missing = [(DOMAIN_VAR, domain), (API_KEY_VAR, api_key), (SECRET_VAR, secret)]
                    .into_iter()
                    .filter_map(|(key, value)| value.is_none().then_some(key))
                    .collect();
                Err(ConfigError::Missing(missing))
            },
        }
    }
}

#[cfg(feature = "dotenv")]
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No env file at {}, using the environment only", path.display());
            return Ok(HashMap::new());
        },
        Err(source) => {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            });
        },
    };

    log::trace!("Reading settings from {}", path.display());
    iter.collect::<Result<_, _>>().map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(feature = "dotenv"))]
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if path.exists() {
        log::warn!("Built without env file support; ignoring {}", path.display());
    }
    Ok(HashMap::new())
}
