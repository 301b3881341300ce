//! TCP transport (§11): one connection per editor session, framed as newline-delimited JSON.
//! Grounded on the teacher's `editor::handle_editor_connection`/`jsonrpc_forwarder`
//! `FramedRead`/`FramedWrite` + `LinesCodec` pairing, and on `daemon::listen_tcp`'s
//! accept-loop-spawns-a-task shape.

use crate::collaborators::{AuthorizationClient, DocumentMetadataStore, UserDirectory};
use crate::operation::Operation;
use crate::protocol::{
    EditAckFrame, HelloFrame, InboundFrame, MemberFrame, OutboundFrame, ResetFrame,
    UsersListFrame,
};
use crate::registry::RoomRegistry;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

/// Accepts connections on `port` forever, spawning one task per connection. Mirrors the
/// teacher's `listen_tcp`: a bind, an `accept` loop that logs and continues past a failed
/// accept rather than tearing down the server, and a `tokio::spawn` per peer.
pub async fn serve<A, M, D>(port: u16, registry: RoomRegistry<A, M, D>) -> anyhow::Result<()>
where
    A: AuthorizationClient + 'static,
    M: DocumentMetadataStore + 'static,
    D: UserDirectory + 'static,
{
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(%port, "listening for editor connections");

    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            error!("error accepting connection");
            continue;
        };

        let registry = registry.clone();
        tokio::spawn(async move {
            debug!(%addr, "connection accepted");
            handle_connection(stream, registry).await;
            debug!(%addr, "connection closed");
        });
    }
}

/// Drives a single editor session end to end: reads the `HelloFrame`, joins the document's
/// room through the registry, then pumps inbound edit/cursor/leave frames against the room
/// while forwarding the room's broadcast topic back to the socket, until either side closes.
async fn handle_connection<A, M, D>(stream: tokio::net::TcpStream, registry: RoomRegistry<A, M, D>)
where
    A: AuthorizationClient + 'static,
    M: DocumentMetadataStore + 'static,
    D: UserDirectory + 'static,
{
    let (read_half, write_half) = stream.into_split();
    let mut lines_in = FramedRead::new(read_half, LinesCodec::new());
    let mut lines_out = FramedWrite::new(write_half, LinesCodec::new());

    let hello_line = match lines_in.next().await {
        Some(Ok(line)) => line,
        Some(Err(e)) => {
            warn!(error = %e, "connection closed before hello frame");
            return;
        }
        None => return,
    };
    let hello: HelloFrame = match serde_json::from_str(&hello_line) {
        Ok(hello) => hello,
        Err(e) => {
            warn!(error = %e, "malformed hello frame");
            return;
        }
    };

    let (handle, snapshot) = match registry
        .join(
            hello.document_id.clone(),
            hello.user_id.clone(),
            hello.user_name.clone(),
        )
        .await
    {
        Ok(pair) => pair,
        Err(e) => {
            warn!(document_id = %hello.document_id, user_id = %hello.user_id, error = %e, "join rejected");
            let _ = lines_out
                .send(serde_json::to_string(&OutboundFrame::Error((&e).into())).unwrap())
                .await;
            return;
        }
    };

    // A single writer task owns the socket's write half; both the broadcast forwarder below
    // and the inbound-edit acknowledgements funnel through this channel so there is only ever
    // one writer (`FramedWrite` is not `Clone`).
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer_task = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            if lines_out.send(line).await.is_err() {
                break;
            }
        }
    });

    if send_frame(&out_tx, &OutboundFrame::Reset(ResetFrame {
        text: snapshot.text,
        server_version: snapshot.server_version,
    }))
    .await
    .is_err()
    {
        drop(out_tx);
        let _ = writer_task.await;
        return;
    }
    let users_list = UsersListFrame {
        users: snapshot
            .members
            .iter()
            .map(|(user_id, info)| MemberFrame {
                user_id: user_id.clone(),
                user_name: info.user_name.clone(),
            })
            .collect(),
    };
    let _ = send_frame(&out_tx, &OutboundFrame::UsersList(users_list)).await;

    let forward_tx = out_tx.clone();
    let mut broadcast_rx = handle.subscribe();
    let forwarder_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(frame) => {
                    if send_frame(&forward_tx, &frame).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // A slow reader missed frames; the client must reconcile via its next
                    // reset rather than trust a partial stream.
                    warn!(skipped, "connection lagged behind document broadcast");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(line) = lines_in.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "error reading line from connection");
                break;
            }
        };
        let frame: InboundFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "malformed inbound frame, ignoring");
                continue;
            }
        };

        match frame {
            InboundFrame::Edit(edit) => {
                let op = Operation {
                    kind: edit.operation.kind,
                    content: edit.operation.content,
                    length: edit.operation.length,
                    position: edit.operation.position,
                    author_id: edit.user_id.clone(),
                    document_id: edit.document_id.clone(),
                    operation_id: None,
                    base_version: edit.operation.base_version,
                    deleted_text: None,
                };
                match handle.apply_edit(op).await {
                    Ok(ack) => {
                        let frame = OutboundFrame::Ack(EditAckFrame {
                            operation_id: ack.operation_id,
                            base_version: ack.base_version,
                        });
                        if send_frame(&out_tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(crate::errors::CoreError::Stale { .. }) => {
                        // §7: a stale baseVersion gets a `reset` frame, not a generic error,
                        // so the client can rebase against the current text.
                        let reset = match handle.snapshot().await {
                            Ok(snapshot) => OutboundFrame::Reset(ResetFrame {
                                text: snapshot.text,
                                server_version: snapshot.server_version,
                            }),
                            Err(e) => OutboundFrame::Error((&e).into()),
                        };
                        if send_frame(&out_tx, &reset).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if send_frame(&out_tx, &OutboundFrame::Error((&e).into())).await.is_err() {
                            break;
                        }
                        if matches!(e, crate::errors::CoreError::Authorization { .. }) {
                            break;
                        }
                    }
                }
            }
            InboundFrame::Cursor(cursor) => {
                if let Err(e) = handle
                    .broadcast_cursor(cursor.user_id.clone(), cursor.position, cursor.user_name)
                    .await
                {
                    let _ = send_frame(&out_tx, &OutboundFrame::Error((&e).into())).await;
                }
            }
            InboundFrame::Leave => break,
        }
    }

    let _ = handle.leave(hello.user_id).await;
    forwarder_task.abort();
    drop(out_tx);
    let _ = writer_task.await;
}

async fn send_frame(tx: &mpsc::Sender<String>, frame: &OutboundFrame) -> Result<(), ()> {
    let line = serde_json::to_string(frame).map_err(|_| ())?;
    tx.send(line).await.map_err(|_| ())
}
