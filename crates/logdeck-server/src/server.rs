//! WebSocket observer endpoint
//!
//! Accepts observer connections, replays the registry snapshot, then pumps
//! broadcast events out and commands in over one socket per observer. Each
//! observer runs in its own task; a slow or dead observer only stalls its
//! own channel.
//!
//! Malformed or unknown inbound frames are dropped without closing the
//! connection: the protocol has no error replies.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use logdeck_core::prelude::*;
use logdeck_core::{Command, ServerEvent};

use logdeck_adb::DeviceBackend;

use crate::broadcast::{Broadcaster, ObserverId};
use crate::dispatch::Dispatcher;

/// The observer-facing WebSocket server
pub struct Server<B> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<B>>,
    broadcaster: Broadcaster,
}

impl<B> Server<B>
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    /// Bind the listening socket. A bind failure is fatal to startup.
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<Dispatcher<B>>,
        broadcaster: Broadcaster,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::bind(addr, e.to_string()))?;

        Ok(Self {
            listener,
            dispatcher,
            broadcaster,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept observers forever. Individual accept failures are logged and
    /// skipped; only the initial bind can take the server down.
    pub async fn run(self) -> Result<()> {
        info!("observer server listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let broadcaster = self.broadcaster.clone();
            tokio::spawn(async move {
                handle_observer(stream, peer, dispatcher, broadcaster).await;
            });
        }
    }
}

/// One observer connection, from handshake to teardown
async fn handle_observer<B>(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher<B>>,
    broadcaster: Broadcaster,
) where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let (id, events) = broadcaster.add_observer();
    info!("observer {} connected from {}", id, peer);

    if let Err(e) = observer_loop(ws, id, events, &dispatcher).await {
        debug!("observer {} closed: {}", id, e);
    }

    broadcaster.remove_observer(id);
    info!("observer {} from {} disconnected", id, peer);
}

async fn observer_loop<B>(
    ws: WebSocketStream<TcpStream>,
    id: ObserverId,
    mut events: tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
    dispatcher: &Dispatcher<B>,
) -> Result<()>
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    let (mut sink, mut inbound) = ws.split();

    // Snapshot first, so the observer has a baseline before any
    // incremental event arrives on its channel.
    let registry = dispatcher.registry();
    send_event(&mut sink, &ServerEvent::DeviceList(registry.device_list())).await?;
    send_event(&mut sink, &ServerEvent::Stats(registry.aggregate_stats())).await?;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => send_event(&mut sink, &event).await?,
                    // Evicted from the fan-out set
                    None => return Ok(()),
                }
            }

            frame = inbound.next() => {
                match frame {
                    Some(Ok(message)) => {
                        if message.is_close() {
                            return Ok(());
                        }
                        if let Ok(text) = message.to_text() {
                            handle_frame(id, text, dispatcher).await;
                        }
                    }
                    Some(Err(e)) => {
                        return Err(Error::websocket(e.to_string()));
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Parse and dispatch one inbound text frame. Anything that does not
/// deserialize into a known command is ignored.
async fn handle_frame<B>(id: ObserverId, text: &str, dispatcher: &Dispatcher<B>)
where
    B: DeviceBackend + Clone + Send + Sync + 'static,
{
    match serde_json::from_str::<Command>(text) {
        Ok(command) => dispatcher.handle(id, command).await,
        Err(e) => {
            debug!("observer {}: ignoring malformed frame: {}", id, e);
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> Result<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(event)?;
    sink.send(Message::text(json))
        .await
        .map_err(|e| Error::websocket(e.to_string()))
}
