//! Scripted fake MCP endpoints for tests.
//!
//! Each script is run with `sh -c` and speaks just enough MCP for one
//! session: answer `initialize` (id 1), swallow `notifications/initialized`,
//! answer one request (id 2).

use std::path::Path;
use std::time::Duration;

use super::types::EndpointDescriptor;

const INIT_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#;

/// Descriptor that runs `script` under `sh -c`.
pub fn scripted(name: &str, script: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(name, "sh", &["-c", script], "scripted test endpoint")
}

/// Answers `tools/list` with one `ping` tool, anything else with `pong from <pid>`.
pub const ECHO_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "case \"$line\" in\n",
    "  *'\"tools/list\"'*) printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"ping","description":"Reply with pong","inputSchema":{"type":"object"}}]}}"#, "' ;;\n",
    "  *) printf '", r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"pong from %s"}]}}"#, "\\n' \"$$\" ;;\n",
    "esac\n",
);

/// Prints log noise and a notification, then sends a server-initiated
/// request and reports whether the gateway refused it.
pub const NOISY_SCRIPT: &str = concat!(
    "read -r line\n",
    "echo 'starting up...'\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"hi"}}"#, "'\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":"srv-1","method":"roots/list"}"#, "'\n",
    "read -r reply\n",
    "case \"$reply\" in\n",
    "  *-32601*) verdict='refused ok' ;;\n",
    "  *) verdict='not refused' ;;\n",
    "esac\n",
    "printf '", r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"%s"}]}}"#, "\\n' \"$verdict\"\n",
);

/// Completes the handshake, then dies with a message on stderr.
pub const CRASH_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "echo boom >&2\n",
    "exit 3\n",
);

/// Rejects `initialize` with a JSON-RPC error.
pub const INIT_ERROR_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"unsupported client"}}"#, "'\n",
    "read -r line\n",
);

/// Answers `tools/call` with `$DCL_FIXED/$DCL_SECRET`.
pub const ENV_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "printf '", r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"%s/%s"}]}}"#, "\\n' \"$DCL_FIXED\" \"$DCL_SECRET\"\n",
);

/// Like `ECHO_SCRIPT`, but prints a line of invalid UTF-8 before each reply.
pub const BINARY_NOISE_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf 'log \\377\\n'\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "printf 'log \\376\\n'\n",
    "printf '", r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"pong from %s"}]}}"#, "\\n' \"$$\"\n",
);

/// Answers `tools/call` with the hex bytes of `$DCL_SECRET`.
pub const HEX_SECRET_SCRIPT: &str = concat!(
    "read -r line\n",
    "printf '%s\\n' '", r#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"fake","version":"0.0.1"}}}"#, "'\n",
    "read -r line\n",
    "read -r line\n",
    "hex=$(printf '%s' \"$DCL_SECRET\" | od -An -tx1 | tr -d ' \\n')\n",
    "printf '", r#"{"jsonrpc":"2.0","id":2,"result":{"content":[{"type":"text","text":"%s"}]}}"#, "\\n' \"$hex\"\n",
);

/// JSON-RPC error body for a rejected `tools/call`.
pub const CALL_ERROR_REPLY: &str =
    r#""error":{"code":-32602,"message":"unknown tool: ping","data":{"hint":"try echo"}}"#;

/// Completes the handshake, then answers the request with
/// `{"jsonrpc":"2.0","id":2,<body>}`.
pub fn reply_to_request(body: &str) -> String {
    format!(
        "read -r line\nprintf '%s\\n' '{INIT_OK}'\nread -r line\nread -r line\nprintf '%s\\n' '{{\"jsonrpc\":\"2.0\",\"id\":2,{body}}}'\n"
    )
}

/// Records its pid, then never answers `initialize`.
pub fn hang_in_handshake(pid_file: &Path) -> String {
    format!("echo $$ > '{}'\nexec sleep 30\n", pid_file.display())
}

/// Records its pid, completes the handshake, then never answers the request.
pub fn hang_after_handshake(pid_file: &Path) -> String {
    format!(
        "echo $$ > '{}'\nread -r line\nprintf '%s\\n' '{INIT_OK}'\nread -r line\nread -r line\nexec sleep 30\n",
        pid_file.display()
    )
}

/// Creates `marker` if it is ever run.
pub fn touch_marker(marker: &Path) -> String {
    format!("touch '{}'\n", marker.display())
}

/// Whether `pid` is a live (non-zombie) process.
pub fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // Format: `pid (comm) state ...`; comm may contain spaces.
    match stat.rfind(')').and_then(|i| stat[i + 1..].split_whitespace().next()) {
        Some(state) => !matches!(state, "Z" | "X"),
        None => false,
    }
}

/// Wait for a script to write its pid file.
pub async fn wait_for_pid(pid_file: &Path) -> u32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(pid_file) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid file {} never appeared", pid_file.display());
}

/// Assert that `pid` stops running shortly.
pub async fn assert_stops(pid: u32) {
    for _ in 0..100 {
        if !is_running(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process {pid} is still running");
}
