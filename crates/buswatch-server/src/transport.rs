//! WebSocket transport.
//!
//! Plain TCP accept loop plus the tungstenite handshake. The request path
//! selects the logical channel, mirroring the three endpoints clients
//! already speak: `/drivers`, `/users`, and `/admin/notification`. Tokens
//! ride in either an `Authorization: Bearer` header or a `?token=` query
//! parameter (mobile WebSocket stacks differ on which they can set).
//!
//! The handshake callback only routes and extracts; token verification is
//! async and happens after the upgrade, before the session is registered.

use std::net::SocketAddr;

use buswatch_core::Channel;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
    },
};

use crate::error::ServerError;

/// WebSocket listener bound to one address.
pub struct WsTransport {
    listener: TcpListener,
}

/// One upgraded client connection, routed to its channel.
pub struct WsConnection {
    /// The WebSocket stream.
    pub socket: WebSocketStream<TcpStream>,
    /// Channel selected by the request path.
    pub channel: Channel,
    /// Token presented during the handshake, if any.
    pub token: Option<String>,
    /// Peer address, for logs.
    pub peer: SocketAddr,
}

impl WsTransport {
    /// Bind the listener.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one TCP connection. The WebSocket upgrade happens in the
    /// per-connection task via [`upgrade`], so a slow handshake cannot
    /// stall the accept loop.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        Ok(self.listener.accept().await?)
    }
}

/// Run the WebSocket handshake and route the connection to a channel.
///
/// Requests for unknown paths are rejected with 404 during the handshake.
pub async fn upgrade(stream: TcpStream, peer: SocketAddr) -> Result<WsConnection, ServerError> {
    let mut channel: Option<Channel> = None;
    let mut token: Option<String> = None;

    let socket = accept_hdr_async(stream, |request: &Request, response: Response| {
        match channel_for_path(request.uri().path()) {
            Some(selected) => {
                channel = Some(selected);
                token = extract_token(request);
                Ok(response)
            },
            None => {
                let mut reject = ErrorResponse::new(Some("unknown channel".to_string()));
                *reject.status_mut() = StatusCode::NOT_FOUND;
                Err(reject)
            },
        }
    })
    .await
    .map_err(|e| ServerError::Transport(format!("handshake with {peer} failed: {e}")))?;

    let channel = channel
        .ok_or_else(|| ServerError::Transport("handshake completed without a channel".into()))?;

    Ok(WsConnection { socket, channel, token, peer })
}

/// Map a request path to its logical channel.
fn channel_for_path(path: &str) -> Option<Channel> {
    match path.trim_end_matches('/') {
        "/drivers" => Some(Channel::Driver),
        "/users" => Some(Channel::User),
        "/admin/notification" => Some(Channel::Admin),
        _ => None,
    }
}

/// Pull a token from the `Authorization` header or the query string.
fn extract_token(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get("authorization") {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    token_from_query(request.uri().query())
}

fn token_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_map_to_channels() {
        assert_eq!(channel_for_path("/drivers"), Some(Channel::Driver));
        assert_eq!(channel_for_path("/users"), Some(Channel::User));
        assert_eq!(channel_for_path("/admin/notification"), Some(Channel::Admin));
        assert_eq!(channel_for_path("/users/"), Some(Channel::User));
    }

    #[test]
    fn unknown_paths_are_rejected() {
        assert_eq!(channel_for_path("/"), None);
        assert_eq!(channel_for_path("/admin"), None);
        assert_eq!(channel_for_path("/api/drivers"), None);
    }

    #[test]
    fn token_from_query_finds_token_pair() {
        assert_eq!(token_from_query(Some("token=abc")), Some("abc".into()));
        assert_eq!(token_from_query(Some("x=1&token=abc&y=2")), Some("abc".into()));
        assert_eq!(token_from_query(Some("token=")), None);
        assert_eq!(token_from_query(Some("x=1")), None);
        assert_eq!(token_from_query(None), None);
    }

    #[test]
    fn bearer_header_wins_over_query() {
        let request = Request::builder()
            .uri("/users?token=from-query")
            .header("authorization", "Bearer from-header")
            .body(())
            .unwrap();

        assert_eq!(extract_token(&request), Some("from-header".into()));
    }

    #[test]
    fn query_token_is_the_fallback() {
        let request = Request::builder().uri("/users?token=from-query").body(()).unwrap();
        assert_eq!(extract_token(&request), Some("from-query".into()));
    }
}
