/*
[INPUT]:  API credentials and signature algorithm
[OUTPUT]: Signatures and login requests for private channels
[POS]:    Auth layer - login handshake for the private WebSocket endpoint
[UPDATE]: When auth flow or signature methods change
*/

pub mod credentials;
pub mod login;
pub mod signer;

pub use credentials::{Credentials, SignType};
pub use login::{LOGIN_METHOD, LOGIN_PATH, login_arg, login_request, login_timestamp};
pub use signer::{Signer, canonical_message};
