use crate::core::DaemonEvent;
use crate::BroadcastMessage;
use radio_proto::protocol::{Broadcast, Message, PROTOCOL_VERSION};
use radio_proto::state::StateManager;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Bind the control socket and serve clients until the process exits.
pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, state_manager, event_tx, broadcast_tx).await;
    })
}

async fn serve(
    listener: TcpListener,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) {
    let mut client_id = 0usize;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                info!("Client {} connected from {}", id, peer);

                let sm = state_manager.clone();
                let evt_tx = event_tx.clone();
                let bcast_rx = broadcast_tx.subscribe();
                tokio::spawn(async move {
                    handle_client(stream, sm, id, evt_tx, bcast_rx).await;
                    info!("Client {} disconnected", id);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Length of the first frame in `buf`, once it has fully arrived.
fn complete_frame_len(buf: &[u8]) -> Option<usize> {
    let header: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    let len = 4 + u32::from_be_bytes(header) as usize;
    (buf.len() >= len).then_some(len)
}

async fn handle_client(
    stream: TcpStream,
    state_manager: Arc<StateManager>,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Send Hello with current state snapshot on connect
    if let Ok(encoded) = encode_hello(&state_manager).await {
        if write_half.write_all(&encoded).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        debug!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);
                        let mut answered = false;

                        while let Some(len) = complete_frame_len(&read_buf) {
                            let decoded = Message::decode(&read_buf);
                            read_buf.drain(..len);
                            match decoded {
                                Ok((Message::Command(cmd), _)) => {
                                    debug!("Client {} sent command: {:?}", client_id, cmd);
                                    if event_tx.send(DaemonEvent::ClientCommand(cmd)).await.is_err() {
                                        warn!("DaemonEvent channel closed");
                                        return;
                                    }
                                    answered = true;
                                }
                                Ok((Message::Broadcast(_), _)) => {
                                    debug!("Client {} sent a broadcast, ignoring", client_id);
                                }
                                Err(e) => {
                                    warn!("Client {} sent a malformed frame: {}", client_id, e);
                                }
                            }
                        }
                        // Commands are applied asynchronously; answer with the
                        // snapshot as it is now, StateUpdated follows later.
                        if answered {
                            if let Ok(encoded) = encode_state(&state_manager).await {
                                if write_half.write_all(&encoded).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                let encoded = match msg {
                    Ok(BroadcastMessage::StateUpdated) => encode_state(&state_manager).await,
                    Ok(BroadcastMessage::Playback(event)) => {
                        Message::Broadcast(Broadcast::Playback { event }).encode()
                    }
                    Ok(BroadcastMessage::Log(message)) => {
                        Message::Broadcast(Broadcast::Log { message }).encode()
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        encode_state(&state_manager).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match encoded {
                    Ok(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("Failed to encode broadcast: {}", e),
                }
            }
        }
    }
}

async fn encode_hello(state_manager: &StateManager) -> anyhow::Result<Vec<u8>> {
    let state = state_manager.get_state().await;
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        state,
    })
    .encode()
}

async fn encode_state(state_manager: &StateManager) -> anyhow::Result<Vec<u8>> {
    let state = state_manager.get_state().await;
    Message::Broadcast(Broadcast::State { data: state }).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_proto::protocol::{Command, PlaybackEvent};

    async fn read_frame(stream: &mut TcpStream) -> Message {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let mut frame = header.to_vec();
        frame.resize(4 + u32::from_be_bytes(header) as usize, 0);
        stream.read_exact(&mut frame[4..]).await.unwrap();
        Message::decode(&frame).unwrap().0
    }

    struct Client {
        stream: TcpStream,
        events: mpsc::Receiver<DaemonEvent>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        _dir: tempfile::TempDir,
    }

    async fn connect() -> Client {
        let dir = tempfile::tempdir().unwrap();
        let sm = Arc::new(StateManager::new(dir.path().join("state.json"), 65));
        let (event_tx, events) = mpsc::channel(16);
        let (broadcast_tx, _) = broadcast::channel(16);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, sm, event_tx, broadcast_tx.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        Client {
            stream,
            events,
            broadcast_tx,
            _dir: dir,
        }
    }

    #[test]
    fn test_complete_frame_len() {
        let encoded = Message::Command(Command::Stop).encode().unwrap();
        assert_eq!(complete_frame_len(&encoded[..2]), None);
        assert_eq!(complete_frame_len(&encoded[..encoded.len() - 1]), None);
        assert_eq!(complete_frame_len(&encoded), Some(encoded.len()));
    }

    #[tokio::test]
    async fn test_hello_then_command_round_trip() {
        let mut c = connect().await;

        match read_frame(&mut c.stream).await {
            Message::Broadcast(Broadcast::Hello {
                protocol_version,
                state,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(state.volume, 65);
                assert!(!state.is_playing);
            }
            other => panic!("expected Hello, got {:?}", other),
        }

        let frame = Message::Command(Command::VolumeUp).encode().unwrap();
        c.stream.write_all(&frame).await.unwrap();

        assert!(matches!(
            c.events.recv().await,
            Some(DaemonEvent::ClientCommand(Command::VolumeUp))
        ));
        assert!(matches!(
            read_frame(&mut c.stream).await,
            Message::Broadcast(Broadcast::State { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let mut c = connect().await;
        read_frame(&mut c.stream).await;

        let garbage = b"{not json";
        let mut bytes = (garbage.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(garbage);
        bytes.extend(Message::Command(Command::Stop).encode().unwrap());
        c.stream.write_all(&bytes).await.unwrap();

        assert!(matches!(
            c.events.recv().await,
            Some(DaemonEvent::ClientCommand(Command::Stop))
        ));
    }

    #[tokio::test]
    async fn test_playback_events_are_forwarded() {
        let mut c = connect().await;
        read_frame(&mut c.stream).await;

        c.broadcast_tx
            .send(BroadcastMessage::Playback(PlaybackEvent::PlaybackStopped))
            .unwrap();
        match read_frame(&mut c.stream).await {
            Message::Broadcast(Broadcast::Playback { event }) => {
                assert_eq!(event, PlaybackEvent::PlaybackStopped)
            }
            other => panic!("expected Playback, got {:?}", other),
        }
    }
}
