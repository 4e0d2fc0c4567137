//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use chatline_shared::TransportError;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{SessionContext, Transport, TransportEvent, TransportLink};

/// Transport over a real websocket. One reader and one writer task per link.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve the handshake URL: validate the scheme and append the token as a
/// `token` query parameter.
pub(crate) fn endpoint_url(session: &SessionContext) -> Result<Url, TransportError> {
    let mut url = Url::parse(&session.url)
        .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", session.url, e)))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other, session.url
            )))
        }
    }

    if let Some(token) = &session.token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(&self, session: &SessionContext) -> Result<TransportLink, TransportError> {
        let url = endpoint_url(session)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        if !session.protocols.is_empty() {
            let value = HeaderValue::from_str(&session.protocols.join(", "))
                .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (ws_stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        crate::log_info!("WebSocket connected to {}", host);

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = unbounded::<String>();
        let (inbound_tx, inbound) = unbounded::<TransportEvent>();

        // Write task: runs until the outbound sender is dropped, then closes.
        let host_for_write = host.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.next().await {
                crate::log_debug!("Sending to {}: {}", host_for_write, text);
                if let Err(e) = write.send(Message::text(text)).await {
                    crate::log_error!("Send failed: {}", e);
                    break;
                }
            }
            crate::log_debug!("Outbound channel to {} finished, closing", host_for_write);
            let _ = write.send(Message::Close(None)).await;
            let _ = write.close().await;
        });

        // Read task: forwards frames in arrival order, then reports the close.
        tokio::spawn(async move {
            let mut code = None;
            let mut reason = String::from("connection closed");

            while let Some(frame) = read.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => TransportEvent::Message(text.to_string()),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => TransportEvent::Message(text),
                        Err(_) => {
                            crate::log_debug!("Ignoring non-UTF-8 binary frame from {}", host);
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        crate::log_info!("WebSocket to {} received close frame", host);
                        if let Some(frame) = frame {
                            code = Some(u16::from(frame.code));
                            reason = frame.reason.to_string();
                        }
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        crate::log_error!("WebSocket read error: {}", e);
                        reason = e.to_string();
                        TransportEvent::Error(e.to_string())
                    }
                };
                let fatal = matches!(event, TransportEvent::Error(_));
                if inbound_tx.unbounded_send(event).is_err() || fatal {
                    break;
                }
            }

            let _ = inbound_tx.unbounded_send(TransportEvent::Closed { code, reason });
        });

        Ok(TransportLink {
            outbound,
            inbound: inbound.boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_as_query_parameter() {
        let session = SessionContext::new("wss://chat.example.com/api/ws?v=2").with_token("a b&c");
        let url = endpoint_url(&session).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("v".to_string(), "2".to_string()),
                ("token".to_string(), "a b&c".to_string())
            ]
        );
    }

    #[test]
    fn non_websocket_schemes_are_rejected() {
        let err = endpoint_url(&SessionContext::new("https://chat.example.com")).unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint(_)));
        assert!(endpoint_url(&SessionContext::new("not a url")).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_a_handshake_error() {
        // Bind then drop a listener to obtain a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = SessionContext::new(format!("ws://{}/ws", addr));
        let err = TungsteniteTransport::new().open(&session).await.err().unwrap();
        assert!(matches!(err, TransportError::Handshake(_)));
    }
}
