//! Request / response envelopes and their JSON wire encoding.
//!
//! ```text
//! Request:  {"id": "r1", "cmd": "ping", "args": {}}
//! Response: {"id": "r1", "ok": true, "code": "OK", "text": "pong"}
//! Interim:  {"id": "r1", "ok": true, "code": "OK", "text": "Connecting", "final": false}
//! ```
//!
//! Decoding fails closed: a request is only produced when every required
//! field is present with the right type. When the input was a JSON object
//! whose `id` could still be read, the [`DecodeError`] carries it so the
//! caller can answer with `ERR_INVALID_PAYLOAD`. Argument values stay
//! untyped here; the registry validates them per command.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped argument mapping as it appears on the wire.
pub type ArgMap = Map<String, Value>;

/// Log previews are cut after this many characters.
pub const PREVIEW_LIMIT: usize = 180;

// ── Status codes ─────────────────────────────────────────────

/// Closed status/error taxonomy shared by both ends of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR_UNKNOWN_COMMAND")]
    UnknownCommand,
    #[serde(rename = "ERR_INVALID_ARGS")]
    InvalidArgs,
    #[serde(rename = "ERR_INVALID_PAYLOAD")]
    InvalidPayload,
    #[serde(rename = "ERR_BUSY")]
    Busy,
    #[serde(rename = "ERR_TIMEOUT")]
    Timeout,
    #[serde(rename = "ERR_FRAMING")]
    Framing,
    #[serde(rename = "ERR_INTERNAL")]
    Internal,
}

impl StatusCode {
    pub const ALL: [Self; 8] = [
        Self::Ok,
        Self::UnknownCommand,
        Self::InvalidArgs,
        Self::InvalidPayload,
        Self::Busy,
        Self::Timeout,
        Self::Framing,
        Self::Internal,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::UnknownCommand => "ERR_UNKNOWN_COMMAND",
            Self::InvalidArgs => "ERR_INVALID_ARGS",
            Self::InvalidPayload => "ERR_INVALID_PAYLOAD",
            Self::Busy => "ERR_BUSY",
            Self::Timeout => "ERR_TIMEOUT",
            Self::Framing => "ERR_FRAMING",
            Self::Internal => "ERR_INTERNAL",
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelopes ────────────────────────────────────────────────

/// A decoded command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Caller-chosen correlation token, never empty.
    pub id: String,
    /// Case-sensitive command name, e.g. `net.ifconfig`.
    pub cmd: String,
    #[serde(default)]
    pub args: ArgMap,
}

impl CommandRequest {
    pub fn new(id: impl Into<String>, cmd: impl Into<String>, args: ArgMap) -> Self {
        Self {
            id: id.into(),
            cmd: cmd.into(),
            args,
        }
    }
}

/// A response envelope, interim or terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: String,
    pub ok: bool,
    pub code: StatusCode,
    pub text: String,
    /// Optional structured payload (e.g. `{"ip": ...}` after provisioning).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ArgMap>,
    /// `false` marks an interim progress response. Omitted on the wire
    /// for terminal responses.
    #[serde(rename = "final", default = "terminal_flag", skip_serializing_if = "is_terminal")]
    pub is_final: bool,
}

fn terminal_flag() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_terminal(flag: &bool) -> bool {
    *flag
}

impl CommandResponse {
    /// Terminal success.
    pub fn success(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            code: StatusCode::Ok,
            text: text.into(),
            data: None,
            is_final: true,
        }
    }

    /// Terminal failure. `ok` follows the code.
    pub fn failure(id: impl Into<String>, code: StatusCode, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: code.is_ok(),
            code,
            text: text.into(),
            data: None,
            is_final: true,
        }
    }

    /// Interim progress notification; never resolves a waiter.
    pub fn interim(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            code: StatusCode::Ok,
            text: text.into(),
            data: None,
            is_final: false,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: ArgMap) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_interim(&self) -> bool {
        !self.is_final
    }
}

// ── Errors ───────────────────────────────────────────────────

/// Why a request could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Not valid JSON (truncated, bad UTF-8, trailing garbage).
    Syntax(String),
    /// Valid JSON, but not an object.
    NotAnObject,
    MissingField(&'static str),
    WrongType(&'static str),
    EmptyField(&'static str),
}

/// Request decode failure, optionally carrying the recovered `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub id: Option<String>,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, id: Option<String>) -> Self {
        Self { kind, id }
    }

    /// The `ERR_INVALID_PAYLOAD` response for this failure, when the
    /// correlation token survived.
    pub fn to_response(&self) -> Option<CommandResponse> {
        let id = self.id.as_ref()?;
        Some(CommandResponse::failure(
            id.clone(),
            StatusCode::InvalidPayload,
            format!("Invalid payload: {}", self.kind),
        ))
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "malformed JSON ({msg})"),
            Self::NotAnObject => write!(f, "payload must be a JSON object"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::WrongType(name) => write!(f, "field '{name}' has the wrong type"),
            Self::EmptyField(name) => write!(f, "field '{name}' must not be empty"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "decode [{id}]: {}", self.kind),
            None => write!(f, "decode: {}", self.kind),
        }
    }
}

/// Serialisation failure on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeError(pub String);

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "encode: {}", self.0)
    }
}

// ── Codec ────────────────────────────────────────────────────

pub fn encode_request(request: &CommandRequest) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(request).map_err(|e| EncodeError(e.to_string()))
}

pub fn encode_response(response: &CommandResponse) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(response).map_err(|e| EncodeError(e.to_string()))
}

/// Decode a request, failing closed on any structural problem.
pub fn decode_request(bytes: &[u8]) -> Result<CommandRequest, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::new(DecodeErrorKind::Syntax(e.to_string()), None))?;

    let Value::Object(mut obj) = value else {
        return Err(DecodeError::new(DecodeErrorKind::NotAnObject, None));
    };

    let id = match obj.remove("id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::String(_)) => {
            return Err(DecodeError::new(DecodeErrorKind::EmptyField("id"), None));
        }
        Some(_) => return Err(DecodeError::new(DecodeErrorKind::WrongType("id"), None)),
        None => return Err(DecodeError::new(DecodeErrorKind::MissingField("id"), None)),
    };

    let fail = |kind| Err(DecodeError::new(kind, Some(id.clone())));

    let cmd = match obj.remove("cmd") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::String(_)) => return fail(DecodeErrorKind::EmptyField("cmd")),
        Some(_) => return fail(DecodeErrorKind::WrongType("cmd")),
        None => return fail(DecodeErrorKind::MissingField("cmd")),
    };

    let args = match obj.remove("args") {
        None | Some(Value::Null) => ArgMap::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return fail(DecodeErrorKind::WrongType("args")),
    };

    Ok(CommandRequest { id, cmd, args })
}

/// Decode a response (caller side).
pub fn decode_response(bytes: &[u8]) -> Result<CommandResponse, DecodeError> {
    let response: CommandResponse = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::new(DecodeErrorKind::Syntax(e.to_string()), None))?;
    if response.id.is_empty() {
        return Err(DecodeError::new(DecodeErrorKind::EmptyField("id"), None));
    }
    Ok(response)
}

// ── Log helpers ──────────────────────────────────────────────

/// Single-line preview of a payload for logs.
pub fn preview(text: &str, limit: usize) -> String {
    let flat = text.replace('\r', "\\r").replace('\n', "\\n");
    let count = flat.chars().count();
    if count <= limit {
        return flat;
    }
    let head: String = flat.chars().take(limit).collect();
    format!("{head}...(len={count})")
}

/// Render request args for logs with secrets masked.
pub fn redacted_args(args: &ArgMap) -> String {
    let mut masked = args.clone();
    for key in ["pwd", "password"] {
        if let Some(v) = masked.get_mut(key) {
            *v = Value::String("***".into());
        }
    }
    Value::Object(masked).to_string()
}

// ── Tests ────────────────────────────────────────────────────
