/*
[INPUT]:  WebSocket configuration, subscriptions and handlers
[OUTPUT]: Multiplexed public/private channel streams over one connection
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding components or changing connection logic
*/

pub mod client;
pub mod codec;
pub mod delivery;
pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use client::WsClient;
pub use codec::{ChannelArg, Envelope, EventKind, LoginArg, Op, OutboundRequest, decode};
pub use delivery::{ErrorHandler, MessageHandler};
pub use registry::{Subscription, SubscriptionRegistry};
pub use session::{SessionExit, SessionState, Termination};
pub use supervisor::Backoff;
pub use transport::{Connector, Frame, FrameReader, FrameWriter, TungsteniteConnector};
