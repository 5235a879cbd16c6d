// Copyright 2025 Tether Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime configuration.
//!
//! Settings come from an optional properties source (`key=value` or
//! `key:value` lines, `#`/`!` comments). Anything absent, empty or malformed
//! falls back to its default; a malformed value is logged, never fatal.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::protocol::error::Result;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9999;

/// What the server does when a call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Reply with a `CallResult::Error` so the caller unblocks.
    #[default]
    Reply,
    /// Close the connection without replying.
    Close,
}

/// Sizing and rejection timing of the admission-controlled worker pool.
///
/// # Example
///
/// ```
/// use tether_common::config::PoolConfig;
///
/// let config = PoolConfig::for_parallelism(6);
/// assert_eq!(config.core_workers, 2);
/// assert_eq!(config.max_workers, 12);
/// assert_eq!(config.queue_capacity, 3000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub core_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    /// Idle time after which a worker beyond `core_workers` retires
    pub keep_alive: Duration,
    /// Let core workers retire after `keep_alive` too
    pub core_timeout: bool,
    /// Sleep between admission retries of a rejected task
    pub backoff: Duration,
    /// Total time a rejected task may keep retrying before it is dropped
    pub retry_window: Duration,
}

impl PoolConfig {
    /// Sizes the pool relative to `parallelism` processors.
    pub fn for_parallelism(parallelism: usize) -> Self {
        let n = parallelism.max(1);
        Self {
            core_workers: if n > 2 { n / 3 } else { n },
            max_workers: n * 2,
            queue_capacity: n * 500,
            keep_alive: Duration::from_secs(180),
            core_timeout: false,
            backoff: Duration::from_millis(50),
            retry_window: Duration::from_millis(300),
        }
    }

    pub fn with_workers(mut self, core: usize, max: usize) -> Self {
        self.core_workers = core;
        self.max_workers = max.max(core).max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_core_timeout(mut self, enabled: bool) -> Self {
        self.core_timeout = enabled;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::for_parallelism(parallelism)
    }
}

/// Process-wide RPC settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcConfig {
    pub address: String,
    pub port: u16,
    /// Upper bound on a single call; `None` waits forever
    pub call_timeout: Option<Duration>,
    /// Pick among several implementations of one interface by weight
    pub load_balancing: bool,
    pub fault_policy: FaultPolicy,
    /// Worker threads of the network runtime
    pub io_threads: usize,
    pub pool: PoolConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            call_timeout: None,
            load_balancing: false,
            fault_policy: FaultPolicy::Reply,
            io_threads: 2,
            pool: PoolConfig::default(),
        }
    }
}

impl RpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_load_balancing(mut self, enabled: bool) -> Self {
        self.load_balancing = enabled;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// `address:port` as a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.address, self.port).parse()?)
    }

    /// `address:port` as a string, for resolution by the connector.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Loads settings from a properties file; a missing file yields the
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_properties(&text);
                tracing::info!(
                    path = %path.display(),
                    address = %config.address,
                    port = config.port,
                    "Loaded configuration"
                );
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Builds a configuration from properties text.
    pub fn from_properties(text: &str) -> Self {
        let props = parse_properties(text);
        let defaults = Self::default();

        let call_timeout: u64 =
            setting("call.timeout.ms", props.get("call.timeout.ms"), 0, |s| s.parse().ok());

        Self {
            address: setting("address", props.get("address"), defaults.address, |s| {
                Some(s.to_string())
            }),
            port: setting("port", props.get("port"), defaults.port, |s| s.parse().ok()),
            call_timeout: (call_timeout > 0).then(|| Duration::from_millis(call_timeout)),
            load_balancing: setting(
                "load.balancing",
                props.get("load.balancing"),
                defaults.load_balancing,
                |s| s.parse().ok(),
            ),
            fault_policy: setting(
                "fault.policy",
                props.get("fault.policy"),
                defaults.fault_policy,
                |s| match s.to_ascii_lowercase().as_str() {
                    "reply" => Some(FaultPolicy::Reply),
                    "close" => Some(FaultPolicy::Close),
                    _ => None,
                },
            ),
            io_threads: setting("io.threads", props.get("io.threads"), defaults.io_threads, |s| {
                s.parse().ok().filter(|n: &usize| *n > 0)
            }),
            pool: PoolConfig {
                core_timeout: setting(
                    "pool.core.timeout",
                    props.get("pool.core.timeout"),
                    defaults.pool.core_timeout,
                    |s| s.parse().ok(),
                ),
                ..defaults.pool
            },
        }
    }
}

/// Resolves one setting, keeping the default for absent, empty or
/// unparseable values.
fn setting<T>(
    key: &str,
    raw: Option<&String>,
    default: T,
    parse: impl FnOnce(&str) -> Option<T>,
) -> T {
    match raw {
        None => default,
        Some(value) if value.is_empty() => default,
        Some(value) => match parse(value) {
            Some(parsed) => parsed,
            None => {
                tracing::warn!(key, value = %value, "Malformed configuration value, using default");
                default
            }
        },
    }
}

/// Splits properties text into a key/value map. All spaces inside values
/// are removed.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line.find(['=', ':']);
        let (key, value) = match split {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };
        props.insert(key.trim().to_string(), value.replace(' ', ""));
    }
    props
}
