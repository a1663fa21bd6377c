//! Messenger bridge client.
//!
//! Each login opens one TCP connection to the bridge. A background reader task
//! routes `Response`/`Failure` lines to the waiting request by id and pushes
//! `Event` lines onto the inbound channel once `Listen` succeeded.

use super::protocol::{
    encode_request, BridgeMessage, BridgeOp, ListenResponse, LoginResponse,
};
use super::{
    AppState, InboundEvent, LoginOptions, LoginRequest, MessengerPlatform, OutgoingMessage,
    PlatformError, PlatformSession, ThreadInfo, UserInfo,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default bridge address.
pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:17780";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, PlatformError>>>>>;
type EventSink = Arc<Mutex<Option<mpsc::UnboundedSender<InboundEvent>>>>;

/// Platform implementation backed by a messenger bridge process.
pub struct BridgePlatform {
    address: String,
}

impl BridgePlatform {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl MessengerPlatform for BridgePlatform {
    async fn login(
        &self,
        request: LoginRequest,
        options: LoginOptions,
    ) -> Result<Arc<dyn PlatformSession>, PlatformError> {
        tracing::debug!(kind = request.kind(), address = %self.address, "bridge login");
        let connection = BridgeConnection::connect(&self.address).await?;

        let op = match request {
            LoginRequest::Credentials(credentials) => BridgeOp::Login {
                email: Some(credentials.email),
                password: Some(credentials.password),
                app_state: None,
                force_login: options.force_login,
            },
            LoginRequest::AppState(state) => BridgeOp::Login {
                email: None,
                password: None,
                app_state: Some(state.0),
                force_login: options.force_login,
            },
        };
        let response: LoginResponse = connection.call_as(op).await?;

        Ok(Arc::new(BridgeSession {
            connection,
            app_state: AppState(response.app_state),
            listening: AtomicBool::new(false),
        }))
    }
}

struct BridgeConnection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    next_id: AtomicU64,
    pending: Pending,
    events: EventSink,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl BridgeConnection {
    async fn connect(address: &str) -> Result<Self, PlatformError> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            PlatformError::Transport(format!("cannot reach bridge at {}: {}", address, e))
        })?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let events: EventSink = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            reader,
            pending.clone(),
            events.clone(),
            connected.clone(),
        ));
        tracing::debug!(address, "connected to messenger bridge");

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            next_id: AtomicU64::new(1),
            pending,
            events,
            connected,
            reader,
        })
    }

    async fn call(&self, op: BridgeOp) -> Result<Value, PlatformError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = encode_request(id, &op)?;
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the pending lock: the reader clears `connected`
            // under the same lock before failing the waiters.
            let mut pending = lock(&self.pending);
            if !self.connected.load(Ordering::SeqCst) {
                return Err(PlatformError::Transport("bridge connection closed".to_string()));
            }
            pending.insert(id, tx);
        }

        tracing::trace!(id, op = op.name(), "bridge request");
        let write_result = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(format!("{}\n", line).as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = write_result {
            lock(&self.pending).remove(&id);
            return Err(PlatformError::Transport(e.to_string()));
        }

        rx.await
            .map_err(|_| PlatformError::Transport("bridge connection closed".to_string()))?
    }

    async fn call_as<T: DeserializeOwned>(&self, op: BridgeOp) -> Result<T, PlatformError> {
        let name = op.name();
        let data = self.call(op).await?;
        serde_json::from_value(data)
            .map_err(|e| PlatformError::Transport(format!("malformed {} response: {}", name, e)))
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    pending: Pending,
    events: EventSink,
    connected: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let reason = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break "bridge closed the connection".to_string(),
            Ok(_) => {}
            Err(e) => break e.to_string(),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let message: BridgeMessage = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable bridge line");
                continue;
            }
        };

        match message {
            BridgeMessage::Response { id, data } => resolve(&pending, id, Ok(data)),
            BridgeMessage::Failure { id, error } => resolve(&pending, id, Err(error.into())),
            BridgeMessage::Event { event } => {
                if let Some(sink) = lock(&events).as_ref() {
                    // Receiver dropped means nobody listens any more
                    let _ = sink.send(event);
                }
            }
        }
    };

    tracing::debug!(reason = %reason, "bridge reader stopped");
    let waiters: Vec<_> = {
        let mut pending = lock(&pending);
        connected.store(false, Ordering::SeqCst);
        pending.drain().map(|(_, waiter)| waiter).collect()
    };
    for waiter in waiters {
        let _ = waiter.send(Err(PlatformError::Transport(reason.clone())));
    }
    if let Some(sink) = lock(&events).take() {
        let _ = sink.send(InboundEvent::Error {
            message: format!("Connection lost: {}", reason),
        });
    }
}

fn resolve(pending: &Pending, id: u64, result: Result<Value, PlatformError>) {
    match lock(pending).remove(&id) {
        Some(waiter) => {
            let _ = waiter.send(result);
        }
        None => tracing::warn!(id, "bridge answered an unknown request"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct BridgeSession {
    connection: BridgeConnection,
    app_state: AppState,
    listening: AtomicBool,
}

#[async_trait]
impl PlatformSession for BridgeSession {
    fn app_state(&self) -> AppState {
        self.app_state.clone()
    }

    async fn thread_info(&self, thread_id: &str) -> Result<ThreadInfo, PlatformError> {
        self.connection
            .call_as(BridgeOp::GetThreadInfo {
                thread_id: thread_id.to_string(),
            })
            .await
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, PlatformError> {
        self.connection
            .call_as(BridgeOp::GetUserInfo {
                user_id: user_id.to_string(),
            })
            .await
    }

    async fn listen(&self) -> Result<mpsc::UnboundedReceiver<InboundEvent>, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.connection.events) = Some(tx);

        match self.connection.call_as::<ListenResponse>(BridgeOp::Listen).await {
            Ok(response) => {
                self.listening.store(response.active, Ordering::SeqCst);
                Ok(rx)
            }
            Err(e) => {
                lock(&self.connection.events).take();
                Err(e)
            }
        }
    }

    fn is_active(&self) -> bool {
        self.listening.load(Ordering::SeqCst) && self.connection.connected.load(Ordering::SeqCst)
    }

    async fn send_message(
        &self,
        message: &OutgoingMessage,
        thread_id: &str,
    ) -> Result<(), PlatformError> {
        self.connection
            .call(BridgeOp::SendMessage {
                message: message.clone(),
                thread_id: thread_id.to_string(),
            })
            .await
            .map(|_| ())
    }

    async fn stop_listening(&self) -> Result<(), PlatformError> {
        self.listening.store(false, Ordering::SeqCst);
        lock(&self.connection.events).take();
        self.connection.call(BridgeOp::StopListening).await.map(|_| ())
    }

    async fn logout(&self) -> Result<(), PlatformError> {
        self.connection.call(BridgeOp::Logout).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
