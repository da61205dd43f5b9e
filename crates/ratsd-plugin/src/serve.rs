//! Plugin side of the transport
//!
//! A plugin binary's `main` hands its attester to [`serve`], which checks
//! that ratsd launched it, prints the handshake and answers JSON-RPC
//! requests until the host closes stdin.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::contract::{EvidenceIn, SubAttester};
use crate::errors::{PluginError, Result};
use crate::wire::{
    method, Handshake, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS,
    MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, METHOD_NOT_FOUND, PARSE_ERROR,
};

/// Serve `attester` over stdin/stdout.
pub async fn serve<A: SubAttester>(attester: A) -> Result<()> {
    if std::env::var(MAGIC_COOKIE_KEY).ok().as_deref() != Some(MAGIC_COOKIE_VALUE) {
        return Err(PluginError::NotLaunchedByHost);
    }

    serve_io(&attester, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve `attester` over an arbitrary byte stream pair.
pub async fn serve_io<A, R, W>(attester: &A, reader: R, mut writer: W) -> Result<()>
where
    A: SubAttester + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut handshake = Handshake::current().to_string();
    handshake.push('\n');
    writer.write_all(handshake.as_bytes()).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch(attester, &line).await;
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }

    tracing::debug!("host closed the channel");
    Ok(())
}

async fn dispatch<A: SubAttester + ?Sized>(attester: &A, line: &str) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return JsonRpcResponse::error(None, PARSE_ERROR, e.to_string()),
    };
    let id = request.id;

    let result = match request.method.as_str() {
        method::GET_SUB_ATTESTER_ID => encode(attester.get_sub_attester_id().await),
        method::GET_SUPPORTED_FORMATS => encode(attester.get_supported_formats().await),
        method::GET_OPTIONS => encode(attester.get_options().await),
        method::GET_EVIDENCE => {
            let input = match request.params.map(serde_json::from_value::<EvidenceIn>) {
                Some(Ok(input)) => input,
                Some(Err(e)) => return JsonRpcResponse::error(Some(id), INVALID_PARAMS, e.to_string()),
                None => {
                    return JsonRpcResponse::error(Some(id), INVALID_PARAMS, "missing params")
                }
            };
            encode(attester.get_evidence(input).await)
        }
        other => {
            return JsonRpcResponse::error(
                Some(id),
                METHOD_NOT_FOUND,
                format!("unknown method {other}"),
            )
        }
    };

    match result {
        Ok(value) => JsonRpcResponse::result(id, value),
        Err(e) => JsonRpcResponse::error(Some(id), INTERNAL_ERROR, e.to_string()),
    }
}

fn encode<T: Serialize>(out: T) -> serde_json::Result<Value> {
    serde_json::to_value(out)
}
