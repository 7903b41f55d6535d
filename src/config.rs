//! Startup configuration.
//!
//! Every value has a default matching the stock deployment and can be
//! overridden through the environment:
//!
//! | Variable                 | Default         |
//! |--------------------------|-----------------|
//! | `WEBHOOK_PORT`           | `443`           |
//! | `WEBHOOK_CERT_PATH`      | `server.crt`    |
//! | `WEBHOOK_KEY_PATH`       | `server.key`    |
//! | `WEBHOOK_MAX_BODY_BYTES` | `4194304`       |
//! | `HEALTH_PORT`            | `8080`          |
//! | `PRESTOP_CONTAINER_NAME` | `linkerd-proxy` |
//! | `PRESTOP_SLEEP_SECONDS`  | `5`             |
//! | `PRESTOP_SHELL`          | `/bin/bash`     |
//! | `SHUTDOWN_GRACE_SECONDS` | `5`             |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "server.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "server.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 443;
/// Default health server port
pub const HEALTH_PORT: u16 = 8080;
/// Default upper bound on an admission request body
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
/// Default time to keep serving after a shutdown signal
pub const SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Container that receives the hook
pub const TARGET_CONTAINER: &str = "linkerd-proxy";
/// Seconds the hook sleeps before the container gets SIGTERM
pub const SLEEP_SECONDS: u32 = 5;
/// Shell used to run the sleep
pub const HOOK_SHELL: &str = "/bin/bash";

/// The preStop hook injected into matching containers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreStopHook {
    /// Exact container name to match
    pub container_name: String,
    /// Sleep duration in seconds
    pub sleep_seconds: u32,
    /// Shell invoked with `-c`
    pub shell: String,
}

impl Default for PreStopHook {
    fn default() -> Self {
        Self {
            container_name: TARGET_CONTAINER.to_string(),
            sleep_seconds: SLEEP_SECONDS,
            shell: HOOK_SHELL.to_string(),
        }
    }
}

impl PreStopHook {
    /// Exec command for the hook, e.g. `["/bin/bash", "-c", "sleep 5"]`
    pub fn command(&self) -> Vec<String> {
        vec![
            self.shell.clone(),
            "-c".to_string(),
            format!("sleep {}", self.sleep_seconds),
        ]
    }
}

/// Webhook process configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub webhook_port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub health_port: u16,
    pub max_body_bytes: usize,
    /// Time between reporting not-ready and exiting
    pub shutdown_grace: Duration,
    pub hook: PreStopHook,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_port: WEBHOOK_PORT,
            cert_path: PathBuf::from(WEBHOOK_CERT_PATH),
            key_path: PathBuf::from(WEBHOOK_KEY_PATH),
            health_port: HEALTH_PORT,
            max_body_bytes: MAX_BODY_BYTES,
            shutdown_grace: Duration::from_secs(SHUTDOWN_GRACE_SECONDS),
            hook: PreStopHook::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset or empty variables keep their default; unparseable numbers are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            webhook_port: parse_var(&get, "WEBHOOK_PORT", defaults.webhook_port)?,
            cert_path: get("WEBHOOK_CERT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cert_path),
            key_path: get("WEBHOOK_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.key_path),
            health_port: parse_var(&get, "HEALTH_PORT", defaults.health_port)?,
            max_body_bytes: parse_var(&get, "WEBHOOK_MAX_BODY_BYTES", defaults.max_body_bytes)?,
            shutdown_grace: Duration::from_secs(parse_var(
                &get,
                "SHUTDOWN_GRACE_SECONDS",
                defaults.shutdown_grace.as_secs(),
            )?),
            hook: PreStopHook {
                container_name: get("PRESTOP_CONTAINER_NAME")
                    .unwrap_or(defaults.hook.container_name),
                sleep_seconds: parse_var(&get, "PRESTOP_SLEEP_SECONDS", defaults.hook.sleep_seconds)?,
                shell: get("PRESTOP_SHELL").unwrap_or(defaults.hook.shell),
            },
        };

        debug!(?config, "Loaded configuration");
        Ok(config)
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
