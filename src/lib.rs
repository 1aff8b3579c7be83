pub mod config;
pub mod gateway;
pub mod mcp_client;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::GatewayConfig;
use gateway::Gateway;
use mcp_client::environment::{self, EnvSource, ProcessEnv};
use mcp_client::LifecycleManager;

/// Log file name inside the configured log directory.
const LOG_FILE_NAME: &str = "gateway.log";

/// Number of rotated log files to keep.
const LOG_FILES_KEPT: u32 = 3;

/// Initialize the tracing subscriber.
///
/// stdout carries the protocol, so logs never go there. Without a log
/// directory they go to stderr; with one:
/// 1. Rotates existing logs (gateway.log → gateway.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh gateway.log with a line-flushing writer.
///
/// Returns the log file path when one is used.
pub fn init_tracing(log_dir: Option<&Path>) -> std::io::Result<Option<PathBuf>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dcl_gateway=info,warn"));

    let Some(log_dir) = log_dir else {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init()
            .map_err(std::io::Error::other)?;
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE_NAME);
    rotate_log_file(&log_path, LOG_FILES_KEPT);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(std::io::Error::other)?;

    Ok(Some(log_path))
}

/// Shift previous gateway logs up one generation before a new run.
///
/// After rotation `gateway.log.1` holds the last run's log and at most
/// `keep` generations remain; `gateway.log` itself no longer exists.
fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let _ = std::fs::remove_file(generation_path(base_path, keep));
    for generation in (1..keep).rev() {
        let _ = std::fs::rename(
            generation_path(base_path, generation),
            generation_path(base_path, generation + 1),
        );
    }
    if base_path.exists() {
        let _ = std::fs::rename(base_path, generation_path(base_path, 1));
    }
}

/// `gateway.log` → `gateway.log.<generation>`.
fn generation_path(base_path: &Path, generation: u32) -> PathBuf {
    let mut name = base_path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shared handle to `gateway.log`; every event is flushed as it is written.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Build the gateway from a resolved configuration.
pub fn build_gateway(config: GatewayConfig) -> Gateway {
    Gateway::new(LifecycleManager::new(
        Arc::new(config.registry),
        config.timeouts,
    ))
}

/// Endpoints whose required variables are not all set, with the missing names.
pub fn endpoints_missing_variables(
    gateway: &Gateway,
    env: &dyn EnvSource,
) -> Vec<(String, Vec<String>)> {
    gateway
        .lifecycle()
        .registry()
        .descriptors()
        .iter()
        .filter_map(|descriptor| {
            let missing = environment::missing(env, &descriptor.required_env);
            (!missing.is_empty()).then(|| (descriptor.name.clone(), missing))
        })
        .collect()
}

/// Log the startup banner and serve on stdio until stdin closes.
pub async fn run(config: GatewayConfig, log_file: Option<PathBuf>) -> std::io::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        endpoints = config.registry.len(),
        config = ?config.source,
        log_file = ?log_file,
        init_timeout_ms = config.timeouts.init.as_millis() as u64,
        operation_timeout_ms = config.timeouts.operation.as_millis() as u64,
        "=== dcl-gateway starting ==="
    );

    let gateway = Arc::new(build_gateway(config));

    for (endpoint, missing) in endpoints_missing_variables(&gateway, &ProcessEnv) {
        tracing::warn!(
            endpoint = %endpoint,
            missing = %missing.join(", "),
            "server is missing required environment variables and will fail until they are set"
        );
    }

    gateway::serve_stdio(gateway).await?;
    tracing::info!("upstream closed, shutting down");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::mcp_client::{EndpointDescriptor, EndpointRegistry, Timeouts};

    #[test]
    fn test_rotate_log_file_keeps_last_three() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join(LOG_FILE_NAME);
        let read = |suffix: &str| {
            std::fs::read_to_string(format!("{}{suffix}", base.display())).ok()
        };

        for generation in 1..=5 {
            std::fs::write(&base, format!("run {generation}")).unwrap();
            rotate_log_file(&base, LOG_FILES_KEPT);
        }

        assert!(!base.exists());
        assert_eq!(read(".1").as_deref(), Some("run 5"));
        assert_eq!(read(".2").as_deref(), Some("run 4"));
        assert_eq!(read(".3").as_deref(), Some("run 3"));
        assert_eq!(read(".4"), None);
    }

    #[test]
    fn test_generation_path_appends_suffix() {
        let base = Path::new("/var/log/dcl/gateway.log");
        assert_eq!(
            generation_path(base, 2),
            PathBuf::from("/var/log/dcl/gateway.log.2")
        );
    }

    #[test]
    fn test_rotate_log_file_without_existing_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join(LOG_FILE_NAME);
        rotate_log_file(&base, LOG_FILES_KEPT);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let file = std::fs::File::create(&path).unwrap();

        let mut writer = FlushingWriter::new(file);
        writer.write_all(b"first line\n").unwrap();
        let mut clone = writer.clone();
        clone.write_all(b"second line\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "first line\nsecond line\n"
        );
    }

    #[test]
    fn test_endpoints_missing_variables() {
        let registry = EndpointRegistry::new(vec![
            EndpointDescriptor::new("open", "open-mcp", &[], ""),
            EndpointDescriptor::new("keyed", "keyed-mcp", &[], "")
                .require_env("KEY_A")
                .require_env("KEY_B"),
        ])
        .unwrap();
        let gateway = build_gateway(GatewayConfig {
            registry,
            timeouts: Timeouts::default(),
            log_dir: None,
            source: None,
        });

        let env = HashMap::from([("KEY_B".to_string(), String::new())]);
        assert_eq!(
            endpoints_missing_variables(&gateway, &env),
            vec![("keyed".to_string(), vec!["KEY_A".to_string()])]
        );
    }
}
