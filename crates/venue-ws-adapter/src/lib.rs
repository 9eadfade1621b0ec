/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public venue WebSocket adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod auth;
pub mod config;
pub mod error;
pub mod ws;

// Re-export commonly used types from auth
pub use auth::{Credentials, SignType, Signer};

pub use config::{ClientConfig, PRIVATE_WS_URL, PUBLIC_WS_URL};
pub use error::{Result, WsError};

// Re-export commonly used types from ws
pub use ws::{
    Backoff,
    ChannelArg,
    Connector,
    Envelope,
    EventKind,
    OutboundRequest,
    SessionState,
    TungsteniteConnector,
    WsClient,
};
