//! Operation types, the `Response` envelope, and the framed wire protocol:
//! length-prefixed messages carrying a self-describing packed value
//! (`rmpv::Value`), decoded into a `{action, collection, payload}`
//! request and dispatched to the [`crate::engine::Engine`].

use std::io;

use rmpv::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{config::Config, engine::Engine, err_at, Error, Result};

/// Binary status carried on every [`Response`]; no richer error code
/// crosses the wire, callers disambiguate from the request's `action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// `Response<T> = {status, data?}`. `data` is present on `Ok` results that
/// carry a value, absent on `Error`.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub status: Status,
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Response<T> {
        Response { status: Status::Ok, data: Some(data) }
    }

    pub fn error() -> Response<T> {
        Response { status: Status::Error, data: None }
    }

    pub fn with_status(status: Status, data: Option<T>) -> Response<T> {
        Response { status, data }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response { status: self.status, data: self.data.map(f) }
    }
}

/// The closed set of actions the wire protocol accepts. An unknown action
/// string closes the connection rather than producing an `Error` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Get,
    Update,
    Delete,
    CreateMany,
    GetMany,
    UpdateMany,
    DeleteMany,
    Find,
}

impl Action {
    pub fn parse(s: &str) -> Option<Action> {
        use Action::*;
        Some(match s {
            "create" => Create,
            "get" => Get,
            "update" => Update,
            "delete" => Delete,
            "createMany" => CreateMany,
            "getMany" => GetMany,
            "updateMany" => UpdateMany,
            "deleteMany" => DeleteMany,
            "find" => Find,
            _ => return None,
        })
    }
}

/// A decoded `{action, collection, payload}` request envelope.
pub struct RequestEnvelope {
    pub action: Action,
    pub collection: String,
    pub payload: Value,
}

/// Read a named field out of a msgpack map value.
pub fn map_get<'a>(val: &'a Value, key: &str) -> Option<&'a Value> {
    val.as_map()?.iter().find_map(|(k, v)| {
        if k.as_str() == Some(key) {
            Some(v)
        } else {
            None
        }
    })
}

pub fn as_doc_id(val: &Value) -> Option<u64> {
    val.as_u64()
}

/// Decode wire bytes into a `Value`, wrapping decode failures as
/// [`Error::CodecFail`].
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let mut cursor = bytes;
    err_at!(CodecFail, rmpv::decode::read_value(&mut cursor))
}

/// Encode a `Value` into wire bytes.
pub fn encode_value(val: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    err_at!(CodecFail, rmpv::encode::write_value(&mut buf, val))?;
    Ok(buf)
}

/// Decode a full request envelope from a frame's payload bytes.
pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope> {
    let val = decode_value(bytes)?;

    let action_str = match map_get(&val, "action").and_then(Value::as_str) {
        Some(s) => s,
        None => return err_at!(CodecFail, msg: "missing action"),
    };
    let action = match Action::parse(action_str) {
        Some(a) => a,
        None => return err_at!(CodecFail, msg: "unknown action {}", action_str),
    };
    let collection = match map_get(&val, "collection").and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => return err_at!(CodecFail, msg: "missing collection"),
    };
    let payload = map_get(&val, "payload").cloned().unwrap_or(Value::Nil);

    Ok(RequestEnvelope { action, collection, payload })
}

/// Build the wire-level `{status, data}` value for a `Response<Value>`.
pub fn encode_response(resp: Response<Value>) -> Value {
    let status = Value::from(match resp.status {
        Status::Ok => "OK",
        Status::Error => "ERROR",
    });
    let mut pairs = vec![(Value::from("status"), status)];
    if let Some(data) = resp.data {
        pairs.push((Value::from("data"), data));
    }
    Value::Map(pairs)
}

/// Read exactly one framed message: a 4-byte big-endian length prefix
/// followed by that many bytes of payload, read in bounded chunks with an
/// overall timeout. Returns `Ok(None)` on a clean EOF before any bytes are
/// read (connection closed between requests). A zero-length prefix comes
/// back as `Ok(Some(Vec::new()))`; the caller must skip it and read the
/// next frame rather than dispatch it — the connection stays open.
pub async fn read_frame(
    socket: &mut (impl tokio::io::AsyncRead + Unpin),
    cfg: &Config,
) -> Result<Option<Vec<u8>>> {
    let deadline = tokio::time::Instant::now() + cfg.read_timeout;

    let mut len_buf = [0u8; 4];
    let read = tokio::time::timeout_at(deadline, socket.read_exact(&mut len_buf)).await;
    let read = match read {
        Ok(r) => r,
        Err(_) => return err_at!(Framing, msg: "read timeout waiting for length prefix"),
    };
    match read {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return err_at!(IOError, Err::<(), _>(err)),
    }

    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Ok(Some(Vec::new()));
    }
    if len > cfg.max_message_bytes {
        return err_at!(Framing, msg: "frame length {} exceeds max {}", len, cfg.max_message_bytes);
    }

    let mut payload = vec![0u8; len as usize];
    let mut filled = 0usize;
    while filled < payload.len() {
        let end = (filled + cfg.io_chunk_bytes).min(payload.len());
        let fut = socket.read_exact(&mut payload[filled..end]);
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(Ok(_)) => filled = end,
            Ok(Err(err)) => return err_at!(IOError, Err::<(), _>(err)),
            Err(_) => return err_at!(Framing, msg: "read timeout mid-frame"),
        }
    }

    Ok(Some(payload))
}

/// Write one framed message: a 4-byte big-endian length prefix followed
/// by the body, written in bounded chunks.
pub async fn write_frame(
    socket: &mut (impl tokio::io::AsyncWrite + Unpin),
    body: &[u8],
    cfg: &Config,
) -> Result<()> {
    let len: u32 = err_at!(Framing, u32::try_from(body.len()))?;
    err_at!(IOError, socket.write_all(&len.to_be_bytes()).await)?;
    for chunk in body.chunks(cfg.io_chunk_bytes) {
        err_at!(IOError, socket.write_all(chunk).await)?;
    }
    Ok(())
}

/// Decode, dispatch, and encode a single request against the engine.
/// Returns `Err` only for connection-level (framing/codec) failures; a
/// business-logic failure is represented as an `ERROR` response value.
pub async fn dispatch(engine: &Engine, payload: &[u8]) -> Result<Value> {
    let req = decode_request(payload)?;
    let resp = engine.handle(req.action, &req.collection, req.payload).await;
    Ok(encode_response(resp))
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;
