/*
[INPUT]:  Outbound control requests / raw inbound text frames
[OUTPUT]: `{"op","args"}` wire text / decoded inbound envelopes
[POS]:    WebSocket layer - frame encoding and decoding
[UPDATE]: When adding ops, event kinds, or argument fields
*/

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::SignType;
use crate::error::{Result, WsError};

/// Liveness ping sent by the client and by the venue
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Instrument id used by account-wide channels
pub const DEFAULT_INST_ID: &str = "default";

/// Control operation of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Subscribe,
    Unsubscribe,
    Login,
}

/// One channel on one instrument, e.g. `ticker` on `SPOT/BTCUSDT`.
///
/// Two args are the same subscription when channel, product type, and
/// instrument id all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArg {
    #[serde(default)]
    pub inst_type: String,
    pub channel: String,
    #[serde(default = "default_inst_id", alias = "coin")]
    pub inst_id: String,
}

fn default_inst_id() -> String {
    DEFAULT_INST_ID.to_string()
}

impl ChannelArg {
    pub fn new(
        inst_type: impl Into<String>,
        channel: impl Into<String>,
        inst_id: impl Into<String>,
    ) -> Self {
        Self {
            inst_type: inst_type.into(),
            channel: channel.into(),
            inst_id: inst_id.into(),
        }
    }

    /// Account-wide channel (orders, positions, balances)
    pub fn account(inst_type: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(inst_type, channel, DEFAULT_INST_ID)
    }

    /// Product type and symbol, the part of the key that is not the channel
    pub fn instrument_key(&self) -> String {
        format!("{}:{}", self.inst_type, self.inst_id)
    }
}

impl fmt::Display for ChannelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.channel, self.inst_type, self.inst_id)
    }
}

/// Signed login argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArg {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
    pub sign_type: SignType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestArg {
    Channel(ChannelArg),
    Login(LoginArg),
}

/// Control message written to the socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRequest {
    pub op: Op,
    pub args: Vec<RequestArg>,
}

impl OutboundRequest {
    pub fn subscribe(args: impl IntoIterator<Item = ChannelArg>) -> Self {
        Self {
            op: Op::Subscribe,
            args: args.into_iter().map(RequestArg::Channel).collect(),
        }
    }

    pub fn unsubscribe(args: impl IntoIterator<Item = ChannelArg>) -> Self {
        Self {
            op: Op::Unsubscribe,
            args: args.into_iter().map(RequestArg::Channel).collect(),
        }
    }

    pub fn login(arg: LoginArg) -> Self {
        Self {
            op: Op::Login,
            args: vec![RequestArg::Login(arg)],
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Kind of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    LoginAck,
    SubscribeAck,
    UnsubscribeAck,
    Data,
    Error,
    Ping,
    Pong,
}

/// Decoded inbound frame; the payload stays opaque
#[derive(Debug, Clone)]
pub struct Envelope {
    pub event: EventKind,
    pub arg: Option<ChannelArg>,
    /// `snapshot` / `update` on data frames
    pub action: Option<String>,
    pub code: Option<i64>,
    pub message: Option<String>,
    pub raw: Arc<str>,
}

impl Envelope {
    fn bare(event: EventKind, raw: &str) -> Self {
        Self {
            event,
            arg: None,
            action: None,
            code: None,
            message: None,
            raw: Arc::from(raw),
        }
    }

    /// Acks without a code, or with code 0, are successful
    pub fn is_success(&self) -> bool {
        self.event != EventKind::Error && self.code.unwrap_or(0) == 0
    }

    pub fn channel(&self) -> Option<&str> {
        self.arg.as_ref().map(|arg| arg.channel.as_str())
    }

    pub fn instrument_key(&self) -> Option<String> {
        self.arg.as_ref().map(ChannelArg::instrument_key)
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: Option<String>,
    arg: Option<ChannelArg>,
    action: Option<String>,
    code: Option<serde_json::Value>,
    msg: Option<String>,
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<Envelope> {
    let trimmed = text.trim();
    if trimmed == PING {
        return Ok(Envelope::bare(EventKind::Ping, trimmed));
    }
    if trimmed == PONG {
        return Ok(Envelope::bare(EventKind::Pong, trimmed));
    }

    let frame: RawFrame =
        serde_json::from_str(trimmed).map_err(|e| WsError::decode(e.to_string(), text))?;

    let event = match frame.event.as_deref() {
        Some("login") => EventKind::LoginAck,
        Some("subscribe") => EventKind::SubscribeAck,
        Some("unsubscribe") => EventKind::UnsubscribeAck,
        Some("error") => EventKind::Error,
        _ if frame.arg.is_some() => EventKind::Data,
        Some(other) => {
            return Err(WsError::decode(format!("unknown event `{other}`"), text));
        }
        None => return Err(WsError::decode("frame has neither event nor arg", text)),
    };

    Ok(Envelope {
        event,
        arg: frame.arg,
        action: frame.action,
        code: frame.code.as_ref().and_then(parse_code),
        message: frame.msg,
        raw: Arc::from(text),
    })
}

fn parse_code(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
