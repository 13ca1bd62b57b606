//! Kodi JSON-RPC host over the raw TCP transport (port 9090)
//!
//! Kodi writes bare JSON objects back-to-back with no framing, so the reader
//! task splits the byte stream with serde_json's streaming deserializer.
//! Responses are routed to their waiting request by `id`; notifications are
//! mapped onto [`PlayerEvent`]s.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{EventSource, PlayerHost};
use crate::config::KodiConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{NowPlayingItem, PlayerEvent};

const READ_CHUNK: usize = 8 * 1024;
const MAX_BUFFERED_BYTES: usize = 4 * 1024 * 1024;
const EVENT_QUEUE: usize = 32;

/// Properties requested from `Player.GetItem`
const NOW_PLAYING_PROPERTIES: &[&str] = &["channel", "channeltype", "title", "showtitle"];
const VIDEO_PLAYER_ID: u64 = 1;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Map a Kodi notification method to a player event
pub fn event_for_notification(method: &str) -> Option<PlayerEvent> {
    match method {
        "Player.OnAVStart" => Some(PlayerEvent::PlaybackStarted),
        "Player.OnStop" => Some(PlayerEvent::PlaybackStopped),
        "System.OnQuit" => Some(PlayerEvent::HostQuit),
        _ => None,
    }
}

/// Split complete JSON values off the front of `buf`.
///
/// Returns the values and how many bytes they consumed. A truncated trailing
/// value is left for the next read; undecodable data is dropped wholesale.
pub fn split_messages(buf: &[u8]) -> (Vec<Value>, usize) {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    let mut messages = Vec::new();
    let mut consumed = 0;

    loop {
        match stream.next() {
            Some(Ok(value)) => {
                messages.push(value);
                consumed = stream.byte_offset();
            }
            Some(Err(e)) if e.is_eof() => break,
            Some(Err(e)) => {
                warn!("Discarding undecodable JSON-RPC data: {}", e);
                consumed = buf.len();
                break;
            }
            None => {
                consumed = stream.byte_offset();
                break;
            }
        }
    }

    (messages, consumed)
}

/// Case-insensitive lookup; Kodi is not consistent about key casing in
/// label and boolean replies.
fn lookup<'a>(object: &'a Value, key: &str) -> Option<&'a Value> {
    let map = object.as_object()?;
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// One live JSON-RPC connection
pub struct KodiRpcClient {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingRequests,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

/// Player notifications from a [`KodiRpcClient`] connection
pub struct KodiEvents {
    receiver: mpsc::Receiver<PlayerEvent>,
}

#[async_trait]
impl EventSource for KodiEvents {
    async fn next_event(&mut self) -> Option<PlayerEvent> {
        self.receiver.recv().await
    }
}

impl KodiRpcClient {
    pub async fn connect(config: &KodiConfig) -> AppResult<(Self, KodiEvents)> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = tokio::time::timeout(config.request_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                AppError::external_service("kodi", format!("connect to {addr} timed out"))
            })??;
        stream.set_nodelay(true)?;
        info!("Connected to Kodi JSON-RPC at {}", addr);

        let (read_half, write_half) = stream.into_split();
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = mpsc::channel(EVENT_QUEUE);
        let reader = tokio::spawn(read_loop(read_half, pending.clone(), sender));

        let client = Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            reader,
        };
        Ok((client, KodiEvents { receiver }))
    }

    /// Issue one JSON-RPC call and return its `result`
    pub async fn call(&self, method: &str, params: Value) -> AppResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().await.insert(id, sender);

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        let payload = serde_json::to_vec(&request)?;

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&payload).await
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            return Err(AppError::host_rpc(method, format!("write failed: {e}")));
        }

        let reply = match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(AppError::host_rpc(method, "connection closed")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(AppError::host_rpc(method, "request timed out"));
            }
        };

        if let Some(error) = reply.get("error") {
            return Err(AppError::host_rpc(method, error.to_string()));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    pub fn is_connected(&self) -> bool {
        !self.reader.is_finished()
    }
}

impl Drop for KodiRpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PlayerHost for KodiRpcClient {
    async fn info_labels(&self, labels: &[&str]) -> AppResult<Vec<String>> {
        let result = self
            .call("XBMC.GetInfoLabels", json!({ "labels": labels }))
            .await?;
        Ok(labels
            .iter()
            .map(|label| {
                lookup(&result, label)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            })
            .collect())
    }

    async fn is_live_tv(&self) -> AppResult<bool> {
        let path = self.info_labels(&["Player.FilenameAndPath"]).await?;
        if path
            .first()
            .is_some_and(|p| p.trim().to_ascii_lowercase().starts_with("pvr://"))
        {
            return Ok(true);
        }

        let booleans = ["PVR.IsPlayingTV", "PVR.IsPlayingRadio"];
        let result = self
            .call("XBMC.GetInfoBooleans", json!({ "booleans": booleans }))
            .await?;
        Ok(booleans
            .iter()
            .any(|b| lookup(&result, b).and_then(Value::as_bool).unwrap_or(false)))
    }

    async fn now_playing(&self) -> AppResult<NowPlayingItem> {
        let result = self
            .call(
                "Player.GetItem",
                json!({ "playerid": VIDEO_PLAYER_ID, "properties": NOW_PLAYING_PROPERTIES }),
            )
            .await?;
        let item = result.get("item").cloned().unwrap_or(Value::Null);
        if item.is_null() {
            return Ok(NowPlayingItem::default());
        }
        serde_json::from_value(item)
            .map_err(|e| AppError::host_rpc("Player.GetItem", format!("unexpected item: {e}")))
    }

    async fn run_plugin(&self, plugin_url: &str) -> AppResult<()> {
        let url = Url::parse(plugin_url)
            .map_err(|e| AppError::parse("plugin url", format!("{plugin_url}: {e}")))?;
        let addon_id = url
            .host_str()
            .filter(|h| url.scheme() == "plugin" && !h.is_empty())
            .ok_or_else(|| AppError::parse("plugin url", format!("not a plugin URL: {plugin_url}")))?;

        let mut params = json!({ "addonid": addon_id, "wait": false });
        if let Some(query) = url.query() {
            params["params"] = Value::String(format!("?{query}"));
        }
        self.call("Addons.ExecuteAddon", params).await?;
        Ok(())
    }
}

/// Reconnectable Kodi handle.
///
/// The engine holds this for its whole lifetime while the service attaches a
/// fresh [`KodiRpcClient`] after every reconnect. Calls made while detached
/// fail with an external service error.
#[derive(Default)]
pub struct KodiHost {
    current: RwLock<Option<Arc<KodiRpcClient>>>,
}

impl KodiHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, client: KodiRpcClient) {
        *self.current.write().await = Some(Arc::new(client));
    }

    pub async fn detach(&self) {
        self.current.write().await.take();
    }

    /// The attached client, as long as its reader is still running
    async fn client(&self) -> AppResult<Arc<KodiRpcClient>> {
        self.current
            .read()
            .await
            .clone()
            .filter(|client| client.is_connected())
            .ok_or_else(|| AppError::external_service("kodi", "not connected"))
    }
}

#[async_trait]
impl PlayerHost for KodiHost {
    async fn info_labels(&self, labels: &[&str]) -> AppResult<Vec<String>> {
        self.client().await?.info_labels(labels).await
    }

    async fn is_live_tv(&self) -> AppResult<bool> {
        self.client().await?.is_live_tv().await
    }

    async fn now_playing(&self) -> AppResult<NowPlayingItem> {
        self.client().await?.now_playing().await
    }

    async fn run_plugin(&self, plugin_url: &str) -> AppResult<()> {
        self.client().await?.run_plugin(plugin_url).await
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: PendingRequests,
    events: mpsc::Sender<PlayerEvent>,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Kodi connection read failed: {}", e);
                break;
            }
        };
        buf.extend_from_slice(&chunk[..n]);

        let (messages, consumed) = split_messages(&buf);
        buf.drain(..consumed);
        if buf.len() > MAX_BUFFERED_BYTES {
            warn!("Dropping {} bytes of unterminated JSON-RPC data", buf.len());
            buf.clear();
        }

        for message in messages {
            dispatch(message, &pending, &events).await;
        }
    }

    // Dropping the senders fails every in-flight call
    pending.lock().await.clear();
    info!("Kodi JSON-RPC connection closed");
}

async fn dispatch(message: Value, pending: &PendingRequests, events: &mpsc::Sender<PlayerEvent>) {
    if let Some(id) = message.get("id").and_then(Value::as_u64) {
        match pending.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(message);
            }
            None => debug!("Late or unsolicited JSON-RPC response id={}", id),
        }
        return;
    }

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return;
    };
    let Some(event) = event_for_notification(method) else {
        return;
    };
    debug!("Kodi notification {} -> {:?}", method, event);
    // Never block the reader: in-flight calls depend on it
    if let Err(e) = events.try_send(event) {
        warn!("Dropping player event {:?}: {}", event, e);
    }
}
