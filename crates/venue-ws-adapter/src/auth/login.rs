/*
[INPUT]:  Credentials, signer, and current unix time
[OUTPUT]: Login request argument for the private WebSocket endpoint
[POS]:    Auth layer - login handshake credential
[UPDATE]: When the login verification path or argument fields change
*/

use super::{Credentials, Signer};
use crate::error::Result;
use crate::ws::codec::{LoginArg, OutboundRequest};

/// Method and path signed for WebSocket login
pub const LOGIN_METHOD: &str = "GET";
pub const LOGIN_PATH: &str = "/user/verify";

/// Unix seconds, as the venue expects in the login timestamp
pub fn login_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Build the signed login argument for `timestamp`
pub fn login_arg(credentials: &Credentials, signer: &Signer, timestamp: &str) -> Result<LoginArg> {
    let sign = signer.sign(LOGIN_METHOD, LOGIN_PATH, "", timestamp)?;
    Ok(LoginArg {
        api_key: credentials.api_key.clone(),
        passphrase: credentials.passphrase.clone(),
        timestamp: timestamp.to_string(),
        sign,
        sign_type: signer.sign_type(),
    })
}

/// Build the complete `{"op":"login"}` request using the current time
pub fn login_request(credentials: &Credentials, signer: &Signer) -> Result<OutboundRequest> {
    let arg = login_arg(credentials, signer, &login_timestamp())?;
    Ok(OutboundRequest::login(arg))
}
