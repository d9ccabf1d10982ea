//! Request/response correlation over one line-oriented duplex stream
//!
//! Many callers may have requests outstanding at once. Each request gets a
//! fresh id and an entry in the in-flight map; the reader task routes every
//! inbound response to its entry by id, in whatever order responses arrive.
//!
//! An entry is settled by whoever removes it from the map: the reader (on a
//! response), its timer (on timeout), or the shutdown path (on stream end).
//! Removal is atomic, so each caller sees exactly one outcome.

pub mod frame;
pub mod line_buffer;

use {
    crate::{
        config::ClientConfig,
        error::{ClientError, ClientResult},
        logging::{self, McpConnectionId},
        protocol::{notification_frame, request_frame},
    },
    dashmap::{mapref::entry::Entry, DashMap},
    frame::InboundFrame,
    line_buffer::{AssembledLine, LineAssembler},
    serde_json::Value,
    std::{
        sync::{
            atomic::{AtomicBool, AtomicU64, Ordering},
            Arc, Weak,
        },
        time::{SystemTime, UNIX_EPOCH},
    },
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
        sync::{broadcast, oneshot, Mutex},
        task::JoinHandle,
    },
    tracing::{debug, warn},
};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Caller waiting for one response
#[derive(Debug)]
pub struct PendingRequest {
    method: String,
    responder: oneshot::Sender<ClientResult<Value>>,
    timeout_handle: Option<JoinHandle<()>>,
}

impl PendingRequest {
    fn settle(self, outcome: ClientResult<Value>) {
        if let Some(handle) = self.timeout_handle {
            handle.abort();
        }
        // The caller may have stopped waiting
        let _ = self.responder.send(outcome);
    }
}

/// In-flight requests by correlation id
pub type InFlightMap = DashMap<String, PendingRequest>;

/// Deferred result of a request that has been written to the stream
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    method: String,
    rx: oneshot::Receiver<ClientResult<Value>>,
}

impl PendingResponse {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the response, timeout or stream failure.
    pub async fn response(self) -> ClientResult<Value> {
        self.rx.await.unwrap_or(Err(ClientError::StreamClosed))
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Shared {
    pending: InFlightMap,
    writer: Mutex<BoxedWriter>,
    config: ClientConfig,
    connection_id: McpConnectionId,
    log_tx: broadcast::Sender<String>,
    closed: AtomicBool,
}

pub struct StreamMultiplexer {
    shared: Arc<Shared>,
    reader_task: JoinHandle<()>,
}

impl StreamMultiplexer {
    /// Attach to a stream: `reader` carries inbound lines, `writer` outbound.
    pub fn new<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_connection_id(reader, writer, config, McpConnectionId::new())
    }

    pub fn with_connection_id<R, W>(
        reader: R,
        writer: W,
        config: ClientConfig,
        connection_id: McpConnectionId,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (log_tx, _) = broadcast::channel(config.log_channel_capacity.max(1));
        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            writer: Mutex::new(Box::new(writer)),
            config,
            connection_id,
            log_tx,
            closed: AtomicBool::new(false),
        });
        let reader_task = tokio::spawn(read_loop(shared.clone(), reader));
        Self { shared, reader_task }
    }

    /// Send a request and wait for its outcome.
    pub async fn send(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.start_request(method, params).await?.response().await
    }

    /// Write a request and return as soon as it is on the wire.
    pub async fn start_request(&self, method: &str, params: Option<Value>) -> ClientResult<PendingResponse> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed);
        }

        let (tx, rx) = oneshot::channel();
        let id = self.shared.register(method, tx);
        self.arm_timeout(&id);

        // The reader may have shut down between the check and the insert
        if self.is_closed() {
            if let Some((_, pending)) = self.shared.pending.remove(&id) {
                pending.settle(Err(ClientError::StreamClosed));
            }
            return Err(ClientError::StreamClosed);
        }

        let frame = request_frame(&id, method, params);
        if let Err(e) = self.shared.write_frame(&frame).await {
            if let Some((_, pending)) = self.shared.pending.remove(&id) {
                pending.settle(Err(ClientError::Stream(e.to_string())));
            }
            return Err(e);
        }

        debug!(connection_id = %self.shared.connection_id, %id, method, "Request sent");
        Ok(PendingResponse {
            id,
            method: method.to_string(),
            rx,
        })
    }

    /// Write a notification; nothing is awaited.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        if self.is_closed() {
            return Err(ClientError::StreamClosed);
        }
        self.shared.write_frame(&notification_frame(method, params)).await
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.shared.pending.contains_key(id)
    }

    /// Whether the inbound side has ended
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn connection_id(&self) -> &McpConnectionId {
        &self.shared.connection_id
    }

    /// Diagnostic lines seen on the stream (and any forwarded by the owner)
    pub fn subscribe_logs(&self) -> broadcast::Receiver<String> {
        self.shared.log_tx.subscribe()
    }

    pub fn log_sender(&self) -> broadcast::Sender<String> {
        self.shared.log_tx.clone()
    }

    /// Stop reading and reject everything still pending.
    pub fn shutdown(&self) {
        self.reader_task.abort();
        self.shared.close(ClientError::StreamClosed, "shutdown");
    }

    fn arm_timeout(&self, id: &str) {
        let timeout = self.shared.config.request_timeout;
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let timer_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(&timer_id);
            }
        });

        match self.shared.pending.get_mut(id) {
            Some(mut entry) => entry.timeout_handle = Some(handle),
            // Already settled
            None => handle.abort(),
        }
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Insert a pending entry under a fresh, unused id.
    fn register(&self, method: &str, responder: oneshot::Sender<ClientResult<Value>>) -> String {
        let request = PendingRequest {
            method: method.to_string(),
            responder,
            timeout_handle: None,
        };
        loop {
            let id = next_request_id();
            if let Entry::Vacant(slot) = self.pending.entry(id.clone()) {
                slot.insert(request);
                return id;
            }
        }
    }

    async fn write_frame(&self, frame: &Value) -> ClientResult<()> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    fn resolve(&self, id: &str, outcome: ClientResult<Value>) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => {
                pending.settle(outcome);
                true
            }
            None => false,
        }
    }

    fn expire(&self, id: &str) {
        if let Some((id, pending)) = self.pending.remove(id) {
            let timeout = self.config.request_timeout;
            logging::log_request_timeout(&self.connection_id, &pending.method, &id, timeout);
            let method = pending.method.clone();
            pending.settle(Err(ClientError::Timeout {
                method,
                id,
                timeout,
            }));
        }
    }

    fn close(&self, reason: ClientError, detail: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        logging::log_stream_closed(&self.connection_id, ids.len(), detail);
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                pending.settle(Err(reason.duplicate()));
            }
        }
    }

    fn on_line(&self, line: AssembledLine) {
        let text = match line {
            AssembledLine::Line(text) => text,
            AssembledLine::Oversized(size) => {
                logging::log_oversized_line(&self.connection_id, size, self.config.max_line_bytes);
                return;
            }
        };

        match frame::classify(&text) {
            InboundFrame::Empty => {}
            InboundFrame::Log(line) => {
                logging::log_server_line(&self.connection_id, &line);
                // No subscribers is fine
                let _ = self.log_tx.send(line);
            }
            InboundFrame::Request { method, id } => {
                debug!(
                    connection_id = %self.connection_id,
                    method = %method,
                    id = id.as_deref(),
                    "Ignoring method-bearing frame"
                );
            }
            InboundFrame::Response { id, outcome } => {
                if !self.resolve(&id, outcome.map_err(ClientError::from)) {
                    logging::log_unmatched_frame(&self.connection_id, &id);
                }
            }
            InboundFrame::Orphan { error } => {
                warn!(
                    connection_id = %self.connection_id,
                    error = ?error,
                    "Dropping response without id"
                );
            }
            InboundFrame::Malformed { id, error } => {
                logging::log_malformed_frame(&self.connection_id, &error, id.as_deref());
                if let Some(id) = id {
                    let outcome = Err(ClientError::MalformedResponse {
                        id: id.clone(),
                        message: error,
                    });
                    if !self.resolve(&id, outcome) {
                        logging::log_unmatched_frame(&self.connection_id, &id);
                    }
                }
            }
        }
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut assembler = LineAssembler::new(shared.config.max_line_bytes);
    let mut buf = vec![0u8; READ_CHUNK_BYTES];

    let (reason, detail) = loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                if let Some(line) = assembler.finish() {
                    shared.on_line(line);
                }
                break (ClientError::StreamClosed, "eof".to_string());
            }
            Ok(n) => {
                for line in assembler.push(&buf[..n]) {
                    shared.on_line(line);
                }
            }
            Err(e) => {
                let detail = e.to_string();
                break (ClientError::Stream(detail.clone()), detail);
            }
        }
    };
    shared.close(reason, &detail);
}

static LAST_ID_MILLIS: AtomicU64 = AtomicU64::new(0);

/// `<millis hex>-<random hex>`; the clock part never goes backwards.
fn next_request_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let millis = LAST_ID_MILLIS.fetch_max(now, Ordering::AcqRel).max(now);
    format!("{:x}-{:08x}", millis, rand::random::<u32>())
}
