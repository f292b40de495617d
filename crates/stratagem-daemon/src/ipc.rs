//! IPC server for daemon communication
//!
//! Provides a Unix domain socket for the CLI and external front-ends. One
//! connection carries one newline-terminated JSON request and one JSON
//! response.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stratagem_config::{Direction, Settings};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::binding::SlotId;
use crate::catalog::MacroCatalog;
use crate::controller::{DragPayload, SettingsUpdate, SlotSnapshot};

// ============================================================================
// IPC Message Types
// ============================================================================

/// Request messages sent from the CLI to the daemon
///
/// Serialized as JSON with a `type` field for discrimination:
/// - `{"type": "assign", "slot": 3, "stratagem": "Resupply"}`
/// - `{"type": "swap", "from": 3, "to": 4}`
/// - `{"type": "drop", "target": 4, "payload": {"from_slot": {"slot": 3}}}`
/// - `{"type": "status"}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Query slots, settings and playback state
    Status,
    /// Put a stratagem on a slot
    Assign { slot: SlotId, stratagem: String },
    /// Remove the stratagem from a slot
    Clear { slot: SlotId },
    /// Exchange the stratagems of two slots
    Swap { from: SlotId, to: SlotId },
    /// A drag-and-drop onto `target`
    Drop { target: SlotId, payload: DragPayload },
    /// Bind the slot to the next key pressed
    StartRemap { slot: SlotId },
    CancelRemap,
    /// Bind a slot to a named key, e.g. "KP7" or "F1"
    Bind { slot: SlotId, key: String },
    /// Play a slot's stratagem as if its key was pressed
    Trigger { slot: SlotId },
    /// Stop the stratagem currently playing
    CancelPlayback,
    SetSettings { settings: SettingsUpdate },
    /// List the catalog by department, optionally filtered by name
    Catalog {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search: Option<String>,
    },
}

/// Response messages sent from the daemon back to the CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Operation completed successfully
    Success {
        /// Optional message with additional details
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Status {
        slots: Vec<SlotSnapshot>,
        settings: Settings,
        /// Slot waiting for a key, if any
        remapping: Option<SlotId>,
        playing: bool,
        /// Latest transient status message, if still showing
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_status: Option<String>,
    },
    Catalog {
        departments: Vec<DepartmentInfo>,
    },
    /// Error occurred while processing request
    Error {
        /// Error description
        message: String,
    },
}

impl IpcResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

/// One sidebar section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepartmentInfo {
    pub name: String,
    pub stratagems: Vec<StratagemInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StratagemInfo {
    pub name: String,
    pub sequence: Vec<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
}

/// Departments and the stratagems matching `query`, in catalog order.
///
/// Uses [`MacroCatalog::search`]; an empty query lists everything and
/// departments without a match are left out.
pub fn catalog_listing(catalog: &MacroCatalog, query: &str) -> Vec<DepartmentInfo> {
    let mut listing: Vec<DepartmentInfo> = Vec::new();
    for stratagem in catalog.search(query) {
        let info = StratagemInfo {
            name: stratagem.name.clone(),
            sequence: stratagem.sequence.clone(),
            icon: catalog.icon_path(&stratagem.name),
        };
        match listing.last_mut() {
            Some(department) if department.name == stratagem.department => {
                department.stratagems.push(info)
            }
            _ => listing.push(DepartmentInfo {
                name: stratagem.department.clone(),
                stratagems: vec![info],
            }),
        }
    }
    listing
}

// ============================================================================
// Socket path
// ============================================================================

const SOCKET_NAME: &str = "stratagem-mapper.sock";

/// Where the daemon listens.
///
/// `$XDG_RUNTIME_DIR/stratagem-mapper.sock` if the variable is set, otherwise
/// `/tmp/stratagem-mapper-$UID.sock`.
pub fn socket_path() -> PathBuf {
    socket_path_in(std::env::var_os("XDG_RUNTIME_DIR"))
}

fn socket_path_in(runtime_dir: Option<OsString>) -> PathBuf {
    match runtime_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => {
            tracing::warn!("XDG_RUNTIME_DIR not set, using fallback socket path in /tmp");
            let uid = nix::unistd::getuid();
            PathBuf::from(format!("/tmp/stratagem-mapper-{}.sock", uid))
        }
    }
}

// ============================================================================
// IPC Server
// ============================================================================

/// IPC server for daemon communication via Unix domain socket
///
/// The socket file is automatically removed when the server is dropped.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Listen on the default [`socket_path`].
    pub fn new() -> Result<Self> {
        Self::bind(socket_path())
    }

    /// Listen on `socket_path`, replacing a stale socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An existing socket file cannot be removed
    /// - The socket cannot be created or bound
    pub fn bind(socket_path: impl Into<PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();

        if socket_path.exists() {
            tracing::debug!("Removing stale socket file: {}", socket_path.display());
            std::fs::remove_file(&socket_path).with_context(|| {
                format!(
                    "Failed to remove stale socket file: {}",
                    socket_path.display()
                )
            })?;
        }

        let listener = UnixListener::bind(&socket_path).with_context(|| {
            format!("Failed to create IPC socket at {}", socket_path.display())
        })?;

        tracing::info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept an incoming connection
    ///
    /// # Errors
    ///
    /// Returns an error if accepting the connection fails.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;

        tracing::debug!("Accepted IPC connection");

        Ok(stream)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::warn!("Failed to remove IPC socket file on shutdown: {}", e);
            } else {
                tracing::debug!("Removed IPC socket file: {}", self.socket_path.display());
            }
        }
    }
}

// ============================================================================
// IPC Connection Handler
// ============================================================================

/// Handle an incoming IPC connection.
///
/// Reads one line of JSON, passes the parsed [`IpcRequest`] to `handler`, and
/// writes back the [`IpcResponse`]. Malformed requests get an error response
/// without reaching the handler.
///
/// # Errors
///
/// Returns an error if reading from or writing to the stream fails.
pub async fn handle_ipc_connection<F, Fut>(mut stream: UnixStream, handler: F) -> Result<()>
where
    F: FnOnce(IpcRequest) -> Fut,
    Fut: Future<Output = IpcResponse>,
{
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    let bytes_read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read IPC request")?;

    if bytes_read == 0 {
        tracing::debug!("IPC connection closed without data");
        return Ok(());
    }

    let line = line.trim();
    tracing::debug!("Received IPC request: {}", line);

    let response = match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => {
            tracing::debug!("Parsed IPC request: {:?}", request);
            handler(request).await
        }
        Err(e) => {
            tracing::warn!("Failed to parse IPC request: {}", e);
            IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            }
        }
    };

    let response_json =
        serde_json::to_string(&response).context("Failed to serialize IPC response")?;

    tracing::debug!("Sending IPC response: {}", response_json);

    writer
        .write_all(response_json.as_bytes())
        .await
        .context("Failed to write IPC response")?;
    writer
        .write_all(b"\n")
        .await
        .context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush IPC response")?;

    Ok(())
}

// ============================================================================
// IPC Client
// ============================================================================

/// Send one request to the daemon at `socket_path` and wait for the response.
///
/// # Errors
///
/// Returns an error if the daemon is not reachable or answers with something
/// that is not an [`IpcResponse`].
pub async fn send_request(socket_path: &Path, request: &IpcRequest) -> Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "Failed to connect to daemon at {} (is stratagemd running?)",
            socket_path.display()
        )
    })?;

    let mut request_json = serde_json::to_string(request).context("Failed to serialize request")?;
    request_json.push('\n');

    let (reader, mut writer) = stream.split();
    writer
        .write_all(request_json.as_bytes())
        .await
        .context("Failed to send request")?;
    writer.flush().await.context("Failed to flush request")?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read response")?;

    serde_json::from_str(line.trim()).context("Failed to parse daemon response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ========================================================================
    // IPC Message Serialization Tests
    // ========================================================================

    #[test]
    fn test_request_assign_serialization() {
        let request = IpcRequest::Assign {
            slot: 3,
            stratagem: "Resupply".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"type":"assign","slot":3,"stratagem":"Resupply"}"#);

        let parsed: IpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_request_drop_payloads() {
        let json = r#"{"type": "drop", "target": 4, "payload": {"from_slot": {"slot": 3}}}"#;
        let request: IpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            IpcRequest::Drop {
                target: 4,
                payload: DragPayload::FromSlot { slot: 3 }
            }
        );

        let json =
            r#"{"type": "drop", "target": 4, "payload": {"from_sidebar": {"name": "Reinforce"}}}"#;
        let request: IpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            IpcRequest::Drop {
                target: 4,
                payload: DragPayload::FromSidebar {
                    name: "Reinforce".to_string()
                }
            }
        );
    }

    #[test]
    fn test_request_unit_variants() {
        assert_eq!(
            serde_json::to_string(&IpcRequest::Status).unwrap(),
            r#"{"type":"status"}"#
        );
        assert_eq!(
            serde_json::to_string(&IpcRequest::CancelRemap).unwrap(),
            r#"{"type":"cancel_remap"}"#
        );
        assert_eq!(
            serde_json::to_string(&IpcRequest::CancelPlayback).unwrap(),
            r#"{"type":"cancel_playback"}"#
        );
    }

    #[test]
    fn test_request_set_settings_partial() {
        let json = r#"{"type": "set_settings", "settings": {"macros_enabled": true}}"#;
        let request: IpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            IpcRequest::SetSettings {
                settings: SettingsUpdate {
                    macros_enabled: Some(true),
                    ..Default::default()
                }
            }
        );
    }

    #[test]
    fn test_response_success_serialization() {
        let response = IpcResponse::Success { message: None };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"type":"success"}"#);

        let response = IpcResponse::success("Slot 3: Resupply");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"type":"success","message":"Slot 3: Resupply"}"#);

        let parsed: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response_status_round_trip() {
        let response = IpcResponse::Status {
            slots: vec![SlotSnapshot {
                slot_id: 3,
                key_code: Some(71),
                label: "7".to_string(),
                stratagem: Some("Resupply".to_string()),
                sequence: Some("↓↓↑→".to_string()),
                icon: None,
                row: 1,
                col: 0,
                row_span: 1,
                col_span: 1,
                remapping: false,
            }],
            settings: Settings::default(),
            remapping: None,
            playing: false,
            last_status: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""stratagem":"Resupply""#));
        assert!(json.contains(r#""keybind_mode":"arrows""#));

        let parsed: IpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response_error_serialization() {
        let response = IpcResponse::error("Unknown slot: 42");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Unknown slot: 42"}"#);
    }

    #[test]
    fn test_catalog_listing_keeps_order() {
        let def = stratagem_config::parse_catalog_str(
            r#"
department "Supply" {
    stratagem "Resupply" "down" "down" "up" "right"
}
department "Mission" {
    stratagem "Reinforce" "up" "down" "right" "left" "up"
    stratagem "SOS Beacon" "up" "down" "right" "up"
}
"#,
        )
        .unwrap();
        let catalog = MacroCatalog::from_def(def);
        let listing = catalog_listing(&catalog, "");

        let names: Vec<_> = listing.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Supply", "Mission"]);
        let mission: Vec<_> = listing[1].stratagems.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(mission, vec!["Reinforce", "SOS Beacon"]);
        assert_eq!(listing[0].stratagems[0].sequence.len(), 4);

        // Filtering drops departments without a match
        let filtered = catalog_listing(&catalog, "sos");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Mission");
        assert_eq!(filtered[0].stratagems.len(), 1);
        assert_eq!(filtered[0].stratagems[0].name, "SOS Beacon");
        assert!(catalog_listing(&catalog, "eagle").is_empty());
    }

    #[test]
    fn test_catalog_request_search_is_optional() {
        let parsed: IpcRequest = serde_json::from_str(r#"{"type":"catalog"}"#).unwrap();
        assert_eq!(parsed, IpcRequest::Catalog { search: None });

        let request = IpcRequest::Catalog {
            search: Some("laser".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"type":"catalog","search":"laser"}"#);
    }

    // ========================================================================
    // Socket path
    // ========================================================================

    #[test]
    fn test_socket_path_prefers_runtime_dir() {
        let path = socket_path_in(Some(OsString::from("/run/user/1000")));
        assert_eq!(path, PathBuf::from("/run/user/1000/stratagem-mapper.sock"));
    }

    #[test]
    fn test_socket_path_fallback() {
        let path = socket_path_in(None);
        let uid = nix::unistd::getuid();
        assert_eq!(
            path,
            PathBuf::from(format!("/tmp/stratagem-mapper-{}.sock", uid))
        );
        assert_eq!(socket_path_in(Some(OsString::new())), path);
    }

    // ========================================================================
    // IPC Server Tests
    // ========================================================================

    #[tokio::test]
    async fn test_ipc_server_creation_and_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join(SOCKET_NAME);

        let server = IpcServer::bind(&socket_path).unwrap();
        assert_eq!(server.socket_path(), socket_path.as_path());
        assert!(socket_path.exists());

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_ipc_server_removes_stale_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join(SOCKET_NAME);

        std::fs::write(&socket_path, "stale").unwrap();

        let server = IpcServer::bind(&socket_path).unwrap();
        assert!(socket_path.exists());

        drop(server);
    }

    #[tokio::test]
    async fn test_request_response_over_socket() {
        let temp_dir = TempDir::new().unwrap();
        let server = IpcServer::bind(temp_dir.path().join(SOCKET_NAME)).unwrap();
        let socket_path = server.socket_path().to_path_buf();

        let handler_task = tokio::spawn(async move {
            let stream = server.accept().await.unwrap();
            handle_ipc_connection(stream, |request| async move {
                match request {
                    IpcRequest::Assign { slot, stratagem } => {
                        IpcResponse::success(format!("Slot {}: {}", slot, stratagem))
                    }
                    other => IpcResponse::error(format!("unexpected {:?}", other)),
                }
            })
            .await
            .unwrap();
        });

        let response = send_request(
            &socket_path,
            &IpcRequest::Assign {
                slot: 3,
                stratagem: "Resupply".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(response, IpcResponse::success("Slot 3: Resupply"));
        handler_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_json_request_handling() {
        let temp_dir = TempDir::new().unwrap();
        let server = IpcServer::bind(temp_dir.path().join(SOCKET_NAME)).unwrap();
        let socket_path = server.socket_path().to_path_buf();

        let handler_task = tokio::spawn(async move {
            let stream = server.accept().await.unwrap();
            handle_ipc_connection(stream, |_| async {
                IpcResponse::success("handler must not run for malformed requests")
            })
            .await
            .unwrap();
        });

        let mut client = UnixStream::connect(&socket_path).await.unwrap();
        client.write_all(b"{not json}\n").await.unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: IpcResponse = serde_json::from_str(line.trim()).unwrap();
        match response {
            IpcResponse::Error { message } => assert!(message.starts_with("Invalid request")),
            other => panic!("expected error, got {:?}", other),
        }
        handler_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_request_without_daemon() {
        let temp_dir = TempDir::new().unwrap();
        let err = send_request(&temp_dir.path().join("missing.sock"), &IpcRequest::Status)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is stratagemd running?"));
    }
}
