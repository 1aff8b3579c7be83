//! Gateway configuration loading and validation.
//!
//! Endpoints come from a built-in default set merged with an optional
//! `mcp_config.json` (or `.yaml`). Timeouts come from the same file and can
//! be overridden by `DCL_INIT_TIMEOUT` / `DCL_OPERATION_TIMEOUT`. Everything
//! is resolved once, before the gateway serves its first request.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::mcp_client::environment::EnvSource;
use crate::mcp_client::{ConfigError, EndpointDescriptor, EndpointRegistry, Timeouts};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "mcp_config.json";

/// Env var naming an explicit config file.
pub const CONFIG_PATH_VAR: &str = "DCL_CONFIG";

/// Env var overriding the handshake timeout (seconds).
pub const INIT_TIMEOUT_VAR: &str = "DCL_INIT_TIMEOUT";

/// Env var overriding the operation timeout (seconds).
pub const OPERATION_TIMEOUT_VAR: &str = "DCL_OPERATION_TIMEOUT";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Fully resolved gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub registry: EndpointRegistry,
    pub timeouts: Timeouts,
    /// When set, logs go to `<log_dir>/gateway.log` instead of stderr.
    pub log_dir: Option<PathBuf>,
    /// The config file that was loaded, if any.
    pub source: Option<PathBuf>,
}

// ─── File Format ─────────────────────────────────────────────────────────────

/// One endpoint entry in the config file.
#[derive(Debug, Clone, Deserialize)]
struct ServerEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    /// Fixed values; an empty string marks the variable as required instead.
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default, alias = "requiredEnv")]
    required_env: Vec<String>,
    #[serde(default)]
    description: String,
}

impl ServerEntry {
    fn into_descriptor(self, name: String) -> EndpointDescriptor {
        let mut required_env: BTreeSet<String> = self.required_env.into_iter().collect();
        let mut env = BTreeMap::new();
        for (key, value) in self.env {
            if value.is_empty() {
                required_env.insert(key);
            } else {
                env.insert(key, value);
            }
        }

        EndpointDescriptor {
            name,
            command: self.command,
            args: self.args,
            required_env,
            env,
            description: self.description,
        }
    }
}

/// Top-level config file (mirrors `mcp_config.json`).
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    /// Entries in file order; repeated names are kept so they can be rejected.
    #[serde(default, deserialize_with = "ordered_entries")]
    servers: Vec<(String, ServerEntry)>,
    #[serde(default = "default_include_defaults")]
    include_defaults: bool,
    #[serde(default)]
    init_timeout_secs: Option<f64>,
    #[serde(default)]
    operation_timeout_secs: Option<f64>,
    #[serde(default)]
    shutdown_grace_ms: Option<u64>,
    #[serde(default)]
    log_dir: Option<String>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            include_defaults: true,
            init_timeout_secs: None,
            operation_timeout_secs: None,
            shutdown_grace_ms: None,
            log_dir: None,
        }
    }
}

fn default_include_defaults() -> bool {
    true
}

/// Deserialize a map into ordered `(key, value)` pairs without collapsing
/// repeated keys.
fn ordered_entries<'de, D>(deserializer: D) -> Result<Vec<(String, ServerEntry)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, ServerEntry)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of server name to server config")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, entry)) = map.next_entry::<String, ServerEntry>()? {
                entries.push((name, entry));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

// ─── Built-in Endpoints ──────────────────────────────────────────────────────

/// Platform-correct npx command.
///
/// Windows requires `npx.cmd` because `npx` is a batch script;
/// `Command::new("npx")` fails without the extension on Windows.
fn npx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

/// Public npx-launched MCP servers available without a config file.
pub fn default_endpoints() -> Vec<EndpointDescriptor> {
    let npx = npx_command();
    vec![
        EndpointDescriptor::new(
            "context7",
            npx,
            &["-y", "@upstash/context7-mcp"],
            "Context7 for checking current code documentation",
        ),
        EndpointDescriptor::new(
            "actors-mcp-server",
            npx,
            &["-y", "@apify/actors-mcp-server"],
            "Apify Actor platform: web scraping, automation, data extraction",
        )
        .require_env("APIFY_TOKEN"),
        EndpointDescriptor::new(
            "github",
            npx,
            &["-y", "@modelcontextprotocol/server-github"],
            "GitHub: repositories, issues, PRs, code search, CI/CD workflows, security",
        )
        .require_env("GITHUB_PERSONAL_ACCESS_TOKEN"),
        EndpointDescriptor::new(
            "dataforseo",
            npx,
            &["-y", "dataforseo-mcp-server", "local"],
            "DataForSEO: SERP data, keywords, backlinks, domain analytics, content analysis",
        )
        .require_env("DATAFORSEO_USERNAME")
        .require_env("DATAFORSEO_PASSWORD"),
    ]
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Find the config file to load.
///
/// Resolution order:
/// 1. `explicit` (from `--config` or `DCL_CONFIG`), returned even if missing
///    so that loading reports it.
/// 2. `mcp_config.json`, `mcp_config.yaml`, `mcp_config.yml` in `cwd`.
/// 3. `<user config dir>/dcl-gateway/mcp_config.json`.
pub fn find_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = ["mcp_config.json", "mcp_config.yaml", "mcp_config.yml"]
        .iter()
        .map(|name| cwd.join(name))
        .find(|candidate| candidate.is_file());
    if local.is_some() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join("dcl-gateway").join(CONFIG_FILE_NAME))
        .filter(|candidate| candidate.is_file())
}

/// Load, merge and validate the gateway configuration.
///
/// `path` is the file chosen by [`find_config_path`]; `None` means built-in
/// defaults only. Timeout overrides are read from `env`.
pub fn load(path: Option<&Path>, env: &dyn EnvSource) -> Result<GatewayConfig, ConfigError> {
    let file = match path {
        Some(path) => read_config_file(path)?,
        None => ConfigFile::default(),
    };

    let timeouts = resolve_timeouts(&file, env)?;
    let log_dir = file.log_dir.as_deref().map(PathBuf::from);

    let defaults = if file.include_defaults {
        default_endpoints()
    } else {
        Vec::new()
    };
    let endpoints = merge_endpoints(defaults, file.servers)?;
    let registry = EndpointRegistry::new(endpoints)?;

    Ok(GatewayConfig {
        registry,
        timeouts,
        log_dir,
        source: path.map(Path::to_path_buf),
    })
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml")
    );

    let parsed = if is_yaml {
        serde_yaml::from_str::<ConfigFile>(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str::<ConfigFile>(&raw).map_err(|e| e.to_string())
    };

    parsed.map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    })
}

/// Merge built-in defaults with file entries.
///
/// A file entry **fully replaces** a default of the same name, in place.
/// A name repeated within the file is a duplicate.
fn merge_endpoints(
    mut defaults: Vec<EndpointDescriptor>,
    entries: Vec<(String, ServerEntry)>,
) -> Result<Vec<EndpointDescriptor>, ConfigError> {
    let mut seen_in_file = BTreeSet::new();

    for (name, entry) in entries {
        if !seen_in_file.insert(name.clone()) {
            return Err(ConfigError::DuplicateName { name });
        }
        let descriptor = entry.into_descriptor(name);
        match defaults.iter_mut().find(|d| d.name == descriptor.name) {
            Some(slot) => *slot = descriptor,
            None => defaults.push(descriptor),
        }
    }

    Ok(defaults)
}

/// Environment overrides win over the file, which wins over the defaults.
fn resolve_timeouts(file: &ConfigFile, env: &dyn EnvSource) -> Result<Timeouts, ConfigError> {
    let defaults = Timeouts::default();

    let init = match env.var_lossy(INIT_TIMEOUT_VAR) {
        Some(raw) => parse_secs(INIT_TIMEOUT_VAR, &raw)?,
        None => file
            .init_timeout_secs
            .map(|secs| secs_to_duration("init_timeout_secs", secs))
            .transpose()?
            .unwrap_or(defaults.init),
    };

    let operation = match env.var_lossy(OPERATION_TIMEOUT_VAR) {
        Some(raw) => parse_secs(OPERATION_TIMEOUT_VAR, &raw)?,
        None => file
            .operation_timeout_secs
            .map(|secs| secs_to_duration("operation_timeout_secs", secs))
            .transpose()?
            .unwrap_or(defaults.operation),
    };

    let shutdown_grace = file
        .shutdown_grace_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.shutdown_grace);

    Ok(Timeouts {
        init,
        operation,
        shutdown_grace,
    })
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
        key: key.to_string(),
        value: raw.to_string(),
    })?;
    secs_to_duration(key, secs)
}

fn secs_to_duration(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::InvalidTimeout {
            key: key.to_string(),
            value: secs.to_string(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidTimeout {
        key: key.to_string(),
        value: secs.to_string(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
