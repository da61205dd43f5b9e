//! Host side of the plugin transport
//!
//! A [`PluginClient`] owns one child process and the JSON-RPC channel on its
//! stdin/stdout. It implements [`SubAttester`] so callers use it like any
//! in-process attester; transport failures come back as failed statuses.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::contract::{
    EvidenceIn, EvidenceOut, OptionsOut, SubAttester, SubAttesterIdOut, SupportedFormatsOut,
};
use crate::errors::{PluginError, Result};
use crate::wire::{
    method, Handshake, JsonRpcRequest, JsonRpcResponse, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
    PROTOCOL_VERSION_KEY,
};

/// Longest line accepted from a plugin; evidence travels base64 encoded
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Both halves keep their partial frames across calls, so a request dropped
/// mid-exchange leaves the stream aligned for the next one.
struct Channel {
    stdin: FramedWrite<ChildStdin, LinesCodec>,
    stdout: FramedRead<ChildStdout, LinesCodec>,
}

pub struct PluginClient {
    path: PathBuf,
    channel: Mutex<Channel>,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
}

impl PluginClient {
    /// Start the plugin binary at `path` and wait for its handshake.
    pub async fn spawn(path: &Path, handshake_timeout: Duration) -> Result<Self> {
        tracing::debug!(plugin = %path.display(), "starting plugin");

        let mut child = Command::new(path)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env(
                PROTOCOL_VERSION_KEY,
                Handshake::current().app_version.to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            abort(child).await;
            return Err(PluginError::Rpc(format!(
                "no stdio pipes for plugin {}",
                path.display()
            )));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(path.to_path_buf(), stderr));
        }

        let mut stdout =
            FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let read = tokio::time::timeout(handshake_timeout, stdout.next()).await;

        let outcome = match read {
            Err(_) => Err(PluginError::HandshakeTimeout(path.to_path_buf())),
            Ok(None) => Err(PluginError::UnknownPlugin(format!(
                "{} exited without a handshake",
                path.display()
            ))),
            Ok(Some(Err(e))) => Err(PluginError::UnknownPlugin(format!(
                "{} sent an unreadable handshake: {e}",
                path.display()
            ))),
            Ok(Some(Ok(line))) => verify_handshake(path, &line).map(|()| line),
        };
        let line = match outcome {
            Ok(line) => line,
            Err(e) => {
                abort(child).await;
                return Err(e);
            }
        };

        tracing::debug!(plugin = %path.display(), handshake = %line.trim(), "plugin handshake complete");

        Ok(Self {
            path: path.to_path_buf(),
            channel: Mutex::new(Channel {
                stdin: FramedWrite::new(stdin, LinesCodec::new()),
                stdout,
            }),
            next_id: AtomicU64::new(1),
            child: Mutex::new(Some(child)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kill the child process. Safe to call more than once.
    pub async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        if let Err(e) = child.kill().await {
            tracing::warn!(plugin = %self.path.display(), "failed to kill plugin process: {e}");
        }
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(plugin = %self.path.display(), %status, "plugin process exited")
            }
            Ok(Err(e)) => tracing::warn!(plugin = %self.path.display(), "error waiting for plugin: {e}"),
            Err(_) => tracing::warn!(plugin = %self.path.display(), "timed out waiting for plugin to exit"),
        }
    }

    /// Send a JSON-RPC request and read its response. The channel stays
    /// locked for the whole exchange; responses to earlier, cancelled
    /// requests are skipped by id.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        tracing::trace!(plugin = %self.path.display(), method, id, "-> plugin request");

        let mut channel = self.channel.lock().await;
        channel.stdin.send(line).await.map_err(codec_error)?;

        loop {
            let Some(buf) = channel.stdout.next().await else {
                return Err(PluginError::Rpc(format!(
                    "plugin {} closed its output",
                    self.path.display()
                )));
            };
            let buf = buf.map_err(codec_error)?;

            let buf = buf.trim();
            if buf.is_empty() {
                continue;
            }

            let resp: JsonRpcResponse = serde_json::from_str(buf)
                .map_err(|e| PluginError::Rpc(format!("invalid response from plugin: {e}")))?;

            match resp.id {
                Some(got) if got != id => {
                    // left over from a cancelled call
                    tracing::debug!(plugin = %self.path.display(), expected = id, got, "discarding stale response");
                    continue;
                }
                _ => {}
            }

            if let Some(err) = resp.error {
                return Err(PluginError::Rpc(err.to_string()));
            }
            return Ok(resp.result.unwrap_or(Value::Null));
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let result = self.request(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl SubAttester for PluginClient {
    async fn get_sub_attester_id(&self) -> SubAttesterIdOut {
        self.call(method::GET_SUB_ATTESTER_ID, None)
            .await
            .unwrap_or_else(|e| SubAttesterIdOut::failure(e.to_string()))
    }

    async fn get_supported_formats(&self) -> SupportedFormatsOut {
        self.call(method::GET_SUPPORTED_FORMATS, None)
            .await
            .unwrap_or_else(|e| SupportedFormatsOut::failure(e.to_string()))
    }

    async fn get_options(&self) -> OptionsOut {
        self.call(method::GET_OPTIONS, None)
            .await
            .unwrap_or_else(|e| OptionsOut::failure(e.to_string()))
    }

    async fn get_evidence(&self, input: EvidenceIn) -> EvidenceOut {
        let params = match serde_json::to_value(&input) {
            Ok(params) => params,
            Err(e) => return EvidenceOut::failure(e.to_string()),
        };

        self.call(method::GET_EVIDENCE, Some(params))
            .await
            .unwrap_or_else(|e| EvidenceOut::failure(e.to_string()))
    }
}

fn verify_handshake(path: &Path, line: &str) -> Result<()> {
    let expected = Handshake::current();
    let Some(got) = Handshake::parse(line) else {
        return Err(PluginError::UnknownPlugin(format!(
            "{} is not a ratsd plugin",
            path.display()
        )));
    };

    if !got.same_kind(&expected) {
        return Err(PluginError::UnknownPlugin(format!(
            "{} serves {}/{}",
            path.display(),
            got.plugin_type,
            got.codec
        )));
    }
    if !got.same_version(&expected) {
        return Err(PluginError::IncompatibleVersion {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            got: got.to_string(),
        });
    }
    Ok(())
}

fn codec_error(err: LinesCodecError) -> PluginError {
    match err {
        LinesCodecError::Io(e) => PluginError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => PluginError::Rpc(format!(
            "plugin response exceeds {MAX_LINE_LENGTH} bytes"
        )),
    }
}

async fn abort(mut child: Child) {
    let _ = child.kill().await;
}

async fn forward_stderr(path: PathBuf, stderr: ChildStderr) {
    let result = for_each_lossy_line(stderr, |line| {
        tracing::debug!(plugin = %path.display(), "{line}");
    })
    .await;
    if let Err(e) = result {
        tracing::warn!(plugin = %path.display(), "failed to read plugin stderr: {e}");
    }
}

/// Lines that are not valid UTF-8 are passed on with replacement characters.
async fn for_each_lossy_line<R, F>(reader: R, mut f: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        f(String::from_utf8_lossy(&buf).trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_classification() {
        let path = Path::new("/plugins/x.plugin");

        assert!(verify_handshake(path, "1|1|subattester|jsonrpc\n").is_ok());
        assert!(matches!(
            verify_handshake(path, "not a plugin"),
            Err(PluginError::UnknownPlugin(_))
        ));
        assert!(matches!(
            verify_handshake(path, "1|1|kvstore|jsonrpc"),
            Err(PluginError::UnknownPlugin(_))
        ));
        assert!(matches!(
            verify_handshake(path, "1|2|subattester|jsonrpc"),
            Err(PluginError::IncompatibleVersion { .. })
        ));
    }

    #[tokio::test]
    async fn stderr_survives_invalid_utf8() {
        let output: &[u8] = b"starting\n\xff\xfe broken\nstill here\n";
        let mut lines = Vec::new();
        for_each_lossy_line(output, |line| lines.push(line.to_string()))
            .await
            .unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "starting");
        assert!(lines[1].ends_with(" broken"));
        assert_eq!(lines[2], "still here");
    }
}
