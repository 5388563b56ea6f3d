//! Outbound peer connections.
//!
//! Dialing a directory URL produces the same kind of peer as an inbound
//! upgrade: the connection registers in the peer set and its frames flow
//! through the shared endpoint.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::peers::{PeerId, PEER_CHANNEL_CAPACITY};
use crate::NetError;

/// Dials `url`, registers the connection as a peer, and drives it on
/// background tasks until it closes. Returns once the connection is live.
pub async fn connect(endpoint: Arc<Endpoint>, url: &str) -> Result<PeerId, NetError> {
    let (socket, _response) = connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(PEER_CHANNEL_CAPACITY);
    let peer_id = endpoint.peers().add(tx);
    info!(%peer_id, url, "connected to peer");

    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let reader_endpoint = endpoint.clone();
    let reader_url = url.to_string();
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => reader_endpoint.handle_frame(peer_id, &text),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        reader_endpoint.peers().remove(peer_id);
        debug!(%peer_id, url = %reader_url, "peer connection closed");
    });

    Ok(peer_id)
}
