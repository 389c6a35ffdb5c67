//! Configuration for HarborKV
//!
//! Centralized configuration with sensible defaults, a builder, a small
//! line-oriented file format and the parameter table behind
//! `CONFIG GET|SET|REWRITE`.
//!
//! ## File Format
//! ```text
//! # comment
//! bind 127.0.0.1 10.0.0.1
//! port 6666
//! requirepass foobared
//! cluster-enabled no
//! namespace.tenant_a token_a
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration for a HarborKV node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Addresses the node listens on
    pub binds: Vec<String>,

    /// TCP listen port
    pub port: u16,

    /// Max concurrent client connections
    pub max_clients: usize,

    /// Idle client timeout in seconds (0 disables)
    pub timeout_secs: u64,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Global password guarding the default namespace (empty = none)
    pub requirepass: String,

    /// Namespace tokens declared in the config file, as (namespace, token)
    pub namespaces: Vec<(String, String)>,

    // -------------------------------------------------------------------------
    // Topology Configuration
    // -------------------------------------------------------------------------
    /// Cluster mode; replication role changes are refused when set
    pub cluster_enabled: bool,

    /// Write-ahead log disabled; replication needs the log so SLAVEOF is refused
    pub wal_disabled: bool,

    /// Namespace tables are propagated from the master (replica copy is read-only)
    pub repl_namespace_enabled: bool,

    /// Upstream to attach to at startup
    pub slaveof: Option<(String, u16)>,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for backups
    pub data_dir: PathBuf,

    /// Keys visited per SCAN call when COUNT is absent
    pub scan_default_count: usize,

    /// File the configuration was loaded from (target of CONFIG REWRITE)
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binds: vec!["127.0.0.1".to_string()],
            port: 6666,
            max_clients: 10000,
            timeout_secs: 0,
            requirepass: String::new(),
            namespaces: Vec::new(),
            cluster_enabled: false,
            wal_disabled: false,
            repl_namespace_enabled: false,
            slaveof: None,
            data_dir: PathBuf::from("./harborkv_data"),
            scan_default_count: 20,
            config_path: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from a file, remembering the path for CONFIG REWRITE
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::parse_str(&text)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse the line-oriented configuration format
    pub fn parse_str(text: &str) -> Result<Self> {
        let mut config = Config::default();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k.to_ascii_lowercase(), v.trim()),
                None => (line.to_ascii_lowercase(), ""),
            };

            if let Some(ns) = key.strip_prefix("namespace.") {
                if ns.is_empty() || value.is_empty() {
                    return Err(Error::Config(format!(
                        "malformed namespace entry at line {}",
                        idx + 1
                    )));
                }
                config.namespaces.push((ns.to_string(), value.to_string()));
                continue;
            }

            let param = find_param(&key).ok_or_else(|| {
                Error::Config(format!(
                    "unknown configuration directive '{}' at line {}",
                    key,
                    idx + 1
                ))
            })?;
            (param.set)(&mut config, value)
                .map_err(|e| Error::Config(format!("line {}: {}", idx + 1, e)))?;
        }

        Ok(config)
    }

    /// Values for every parameter whose name matches the glob `pattern`,
    /// flattened as `[name, value, name, value, ...]`
    pub fn get_matching(&self, pattern: &str) -> Vec<String> {
        let pattern = pattern.to_ascii_lowercase();
        let mut values = Vec::new();
        for param in PARAMS {
            if glob_match(pattern.as_bytes(), param.name.as_bytes()) {
                values.push(param.name.to_string());
                values.push((param.get)(self));
            }
        }
        values
    }

    /// Apply `CONFIG SET name value`
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        let param = find_param(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::Config("Unsupported CONFIG parameter".to_string()))?;
        if param.read_only {
            return Err(Error::Config("can't set readonly config".to_string()));
        }
        (param.set)(self, value)
    }

    /// Serialize the live configuration, including namespace tokens
    pub fn render(&self, namespaces: &[(String, String)]) -> String {
        let mut out = String::new();
        for param in PARAMS {
            let value = (param.get)(self);
            if value.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{} {}", param.name, value);
        }
        for (ns, token) in namespaces {
            let _ = writeln!(out, "namespace.{} {}", ns, token);
        }
        out
    }

    /// Rewrite the file the node was started with
    pub fn rewrite(&self, namespaces: &[(String, String)]) -> Result<()> {
        let path = self.config_path.as_ref().ok_or_else(|| {
            Error::Config("the server is running without a config file".to_string())
        })?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, self.render(namespaces))?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the listen addresses
    pub fn binds<I, S>(mut self, binds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.binds = binds.into_iter().map(Into::into).collect();
        self
    }

    /// Set the listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the global password
    pub fn requirepass(mut self, password: impl Into<String>) -> Self {
        self.config.requirepass = password.into();
        self
    }

    /// Declare a namespace token
    pub fn namespace(mut self, ns: impl Into<String>, token: impl Into<String>) -> Self {
        self.config.namespaces.push((ns.into(), token.into()));
        self
    }

    pub fn cluster_enabled(mut self, enabled: bool) -> Self {
        self.config.cluster_enabled = enabled;
        self
    }

    pub fn wal_disabled(mut self, disabled: bool) -> Self {
        self.config.wal_disabled = disabled;
        self
    }

    pub fn repl_namespace_enabled(mut self, enabled: bool) -> Self {
        self.config.repl_namespace_enabled = enabled;
        self
    }

    /// Attach to an upstream at startup
    pub fn slaveof(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.slaveof = Some((host.into(), port));
        self
    }

    /// Set the data directory (root for backups)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_clients(mut self, count: usize) -> Self {
        self.config.max_clients = count;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn scan_default_count(mut self, count: usize) -> Self {
        self.config.scan_default_count = count;
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Parameter Table
// =============================================================================

struct ConfigParam {
    name: &'static str,
    read_only: bool,
    get: fn(&Config) -> String,
    set: fn(&mut Config, &str) -> Result<()>,
}

const PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "bind",
        read_only: true,
        get: |c| c.binds.join(" "),
        set: |c, v| {
            c.binds = v.split_whitespace().map(str::to_string).collect();
            Ok(())
        },
    },
    ConfigParam {
        name: "port",
        read_only: true,
        get: |c| c.port.to_string(),
        set: |c, v| {
            c.port = parse_number(v)?;
            Ok(())
        },
    },
    ConfigParam {
        name: "requirepass",
        read_only: false,
        get: |c| c.requirepass.clone(),
        set: |c, v| {
            c.requirepass = v.to_string();
            Ok(())
        },
    },
    ConfigParam {
        name: "cluster-enabled",
        read_only: true,
        get: |c| yes_no(c.cluster_enabled),
        set: |c, v| {
            c.cluster_enabled = parse_yes_no(v)?;
            Ok(())
        },
    },
    ConfigParam {
        name: "rocksdb.write_options.disable_wal",
        read_only: false,
        get: |c| yes_no(c.wal_disabled),
        set: |c, v| {
            c.wal_disabled = parse_yes_no(v)?;
            Ok(())
        },
    },
    ConfigParam {
        name: "repl-namespace-enabled",
        read_only: false,
        get: |c| yes_no(c.repl_namespace_enabled),
        set: |c, v| {
            c.repl_namespace_enabled = parse_yes_no(v)?;
            Ok(())
        },
    },
    ConfigParam {
        name: "slaveof",
        read_only: true,
        get: |c| {
            c.slaveof
                .as_ref()
                .map(|(h, p)| format!("{} {}", h, p))
                .unwrap_or_default()
        },
        set: |c, v| {
            let mut parts = v.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(host), Some(port), None) => {
                    c.slaveof = Some((host.to_string(), parse_number(port)?));
                    Ok(())
                }
                _ => Err(Error::Config("slaveof expects <host> <port>".to_string())),
            }
        },
    },
    ConfigParam {
        name: "dir",
        read_only: true,
        get: |c| c.data_dir.display().to_string(),
        set: |c, v| {
            c.data_dir = PathBuf::from(v);
            Ok(())
        },
    },
    ConfigParam {
        name: "maxclients",
        read_only: false,
        get: |c| c.max_clients.to_string(),
        set: |c, v| {
            c.max_clients = parse_number(v)?;
            Ok(())
        },
    },
    ConfigParam {
        name: "timeout",
        read_only: false,
        get: |c| c.timeout_secs.to_string(),
        set: |c, v| {
            c.timeout_secs = parse_number(v)?;
            Ok(())
        },
    },
];

fn find_param(name: &str) -> Option<&'static ConfigParam> {
    PARAMS.iter().find(|p| p.name == name)
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "yes" } else { "no" };
    text.to_string()
}

fn parse_yes_no(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(Error::Config("argument must be 'yes' or 'no'".to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid number '{}'", value)))
}

/// Glob match supporting `*` and `?`
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}
