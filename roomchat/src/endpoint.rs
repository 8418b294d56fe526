//! WebSocket endpoint construction.
//!
//! The server endpoint is parameterized by room and user: the base URL comes
//! from configuration (an explicit `ws_url`, or a localhost port during
//! development) and the identity rides as `roomId` / `userName` query
//! parameters. The session core never builds URLs any other way.

use url::Url;

/// Errors producing a connectable endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Neither an explicit base URL nor a development port is configured.
    #[error("no WebSocket base URL configured (set --ws-url or --ws-port)")]
    MissingBase,

    /// The configured base URL does not parse.
    #[error("invalid WebSocket base URL {base:?}: {source}")]
    InvalidBase {
        /// The offending base URL.
        base: String,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

/// Resolve the base URL from an explicit setting or a development port.
///
/// An explicit `ws_url` always wins; otherwise `ws_port` yields a loopback
/// development URL.
///
/// # Errors
///
/// Returns [`EndpointError::MissingBase`] when neither is configured.
pub fn resolve_base(ws_url: Option<&str>, ws_port: Option<u16>) -> Result<String, EndpointError> {
    if let Some(url) = ws_url {
        return Ok(url.to_string());
    }
    ws_port
        .map(|port| format!("ws://127.0.0.1:{port}"))
        .ok_or(EndpointError::MissingBase)
}

/// Build the join URL for an identity: base plus `roomId` / `userName`
/// query parameters, percent-encoded.
///
/// # Errors
///
/// Returns [`EndpointError::InvalidBase`] when the base URL does not parse.
pub fn join_url(base: &str, room_id: &str, user_name: &str) -> Result<Url, EndpointError> {
    let mut url = Url::parse(base).map_err(|source| EndpointError::InvalidBase {
        base: base.to_string(),
        source,
    })?;
    url.query_pairs_mut()
        .append_pair("roomId", room_id)
        .append_pair("userName", user_name);
    Ok(url)
}
