//! The per-connection session adapter.
//!
//! One task per accepted connection. The task alternates between reading
//! frames off the socket and draining the session's outbound channel;
//! engine completions run on shard workers and only ever push onto that
//! channel, so a slow client can never stall a shard. Every exit path ends
//! in a cleanup pass that releases whatever the client still holds.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::engine::{Completion, Engine};
use crate::protocol::{self, Acquired, Request, RequestKind};

/// Feedback from engine completions to the session task.
enum Outbound {
    /// Write this frame to the client.
    Frame(bytes::Bytes),
    /// Drop the connection; the client broke the protocol.
    Close,
}

/// Serve one client connection until it disconnects, misbehaves, or the
/// process stops. The client id is its remote address rendered to a string,
/// unique for the lifetime of the connection by TCP rules.
pub(crate) async fn serve<S>(engine: Arc<Engine>, socket: S, addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let client = addr.to_string();
    log::info!("connection accepted: {}", client);

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
    let mut socket = socket;
    let mut buffer = [0u8; protocol::MAX_FRAME_LEN];

    loop {
        tokio::select! {
            read = socket.read(&mut buffer) => match read {
                Ok(0) => {
                    log::info!("connection closed by remote (EOF): {}", client);
                    break;
                }
                Ok(n) => {
                    let request = match Request::decode(&buffer[..n]) {
                        Ok(request) => request,
                        Err(err) => {
                            log::error!("decoding error from {}, closing connection: {}", client, err);
                            break;
                        }
                    };
                    if let Err(err) = submit(&engine, &client, &outbound, request).await {
                        log::error!("failed to submit action for {}: {}", client, err);
                        break;
                    }
                }
                Err(err) => {
                    log::error!("connection read error from {}: {}", client, err);
                    break;
                }
            },
            Some(message) = outbound_rx.recv() => match message {
                Outbound::Frame(frame) => {
                    if let Err(err) = socket.write_all(&frame).await {
                        log::error!("failed to write to {}: {}", client, err);
                        break;
                    }
                }
                Outbound::Close => {
                    log::info!("disconnecting misbehaving client {}", client);
                    break;
                }
            },
        }
    }

    engine.cleanup(&client).await;
    log::debug!("session for {} finished", client);
}

/// Turn a decoded request into an engine action whose completion feeds the
/// outbound channel.
async fn submit(
    engine: &Engine,
    client: &str,
    outbound: &mpsc::UnboundedSender<Outbound>,
    request: Request,
) -> Result<(), crate::engine::EngineError> {
    match request.kind {
        RequestKind::Acquire => {
            let completion = acquired_completion(outbound.clone(), request.tag.clone());
            engine.acquire(&request.tag, client, completion).await
        }
        RequestKind::Release => {
            let completion = release_completion(outbound.clone());
            engine.release(&request.tag, client, completion).await
        }
    }
}

/// On grant, queue the ACQUIRED frame; a dead session means the grant
/// cannot be delivered and is reported back as a completion failure. On
/// rejection, ask the session to drop the connection without writing.
fn acquired_completion(outbound: mpsc::UnboundedSender<Outbound>, tag: String) -> Completion {
    Box::new(move |verdict| match verdict {
        Ok(()) => {
            log::debug!("notifying client of acquisition of {}", tag);
            let frame = Acquired { tag }.encode();
            outbound
                .send(Outbound::Frame(frame))
                .map_err(|_| anyhow::anyhow!("client connection is gone"))
        }
        Err(rejection) => {
            log::error!("acquire rejected: {}", rejection);
            let _ = outbound.send(Outbound::Close);
            Ok(())
        }
    })
}

/// Releases produce no feedback frame; only a rejection is visible, as a
/// dropped connection.
fn release_completion(outbound: mpsc::UnboundedSender<Outbound>) -> Completion {
    Box::new(move |verdict| {
        if let Err(rejection) = verdict {
            log::error!("release rejected: {}", rejection);
            let _ = outbound.send(Outbound::Close);
        }
        Ok(())
    })
}
