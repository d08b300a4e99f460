//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use fieldhouse_shared::ConnectionError;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, DisconnectReason, Link, LinkEvent};

/// Opens real WebSocket links; one read task and one write task per link.
#[derive(Debug, Clone, Default)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectionError> {
        let (ws_stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| ConnectionError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        crate::log_info!("WebSocket connected to {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (event_tx, event_rx) = unbounded::<LinkEvent>();
        let (frame_tx, mut frame_rx) = unbounded::<String>();

        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if event_tx
                            .unbounded_send(LinkEvent::Frame(text.to_string()))
                            .is_err()
                        {
                            // Link consumer is gone
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        crate::log_info!("WebSocket received close frame: {:?}", frame);
                        let _ = event_tx
                            .unbounded_send(LinkEvent::Closed(DisconnectReason::ServerClosed));
                        return;
                    }
                    Ok(Message::Ping(data)) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.unbounded_send(LinkEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            let _ = event_tx.unbounded_send(LinkEvent::Closed(DisconnectReason::TransportLost(
                "stream ended".to_string(),
            )));
        });

        tokio::spawn(async move {
            while let Some(frame) = frame_rx.next().await {
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    crate::log_error!("Send failed: {}", e);
                    break;
                }
            }
            // Sender dropped: close our side
            let _ = write.close().await;
        });

        Ok(Link {
            outbound: frame_tx,
            inbound: event_rx,
        })
    }
}
