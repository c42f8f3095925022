use crate::{
    codec::{self, Codec},
    error::{Error, Result},
    event::Event,
    misc::antidote,
    pipe::{LocalStream, ShutdownHandle},
    scheduler::Scheduler,
    worker::Worker,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        mpsc, Arc, Mutex, Once,
    },
};

/// One live session over a data pipe.
///
/// A connection owns its pipe stream and the two background loops that service it: the read loop
/// turns inbound frames into message events, the write loop drains a FIFO queue of outbound
/// messages. `R` is the inbound message type, `W` the outbound one.
///
/// Connections are handed out by [`Server`](crate::Server) and [`Client`](crate::Client) as
/// `Arc`s inside event callbacks; they are not constructed directly. Pushing a message never
/// blocks: it enqueues and wakes the write loop. Once a connection reports
/// [`disconnected`](Connection::on_disconnected) (which happens exactly once, however the session
/// ends), it is dead for good: sessions are never resurrected, reconnecting means a new
/// connection.
pub struct Connection<R, W = R> {
    id: u64,
    name: String,
    connected: AtomicBool,
    opened: AtomicBool,
    close_once: Once,
    disconnect_once: Once,
    stream: Arc<LocalStream>,
    shutdown: ShutdownHandle,
    queue_tx: mpsc::Sender<QueueItem<W>>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueueItem<W>>>>,
    codec: Arc<dyn Codec<R, W>>,
    scheduler: Arc<dyn Scheduler>,
    events: ConnectionEvents<R, W>,
}

enum QueueItem<W> {
    Message(W),
    /// Wakes a parked write loop so it can notice the close.
    Shutdown,
}

pub(crate) struct ConnectionEvents<R, W> {
    pub(crate) message: Event<(Arc<Connection<R, W>>, R)>,
    pub(crate) disconnected: Event<Arc<Connection<R, W>>>,
    pub(crate) error: Event<(Arc<Connection<R, W>>, Arc<Error>)>,
}

impl<R, W> Default for ConnectionEvents<R, W> {
    fn default() -> Self {
        Self {
            message: Event::default(),
            disconnected: Event::default(),
            error: Event::default(),
        }
    }
}

impl<R: Send + 'static, W: Send + 'static> Connection<R, W> {
    pub(crate) fn new(
        id: u64,
        stream: LocalStream,
        codec: Arc<dyn Codec<R, W>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Arc<Self>> {
        let shutdown = ShutdownHandle::for_stream(&stream)?;
        let (queue_tx, queue_rx) = mpsc::channel();
        Ok(Arc::new(Self {
            id,
            name: format!("Client {id}"),
            connected: AtomicBool::new(true),
            opened: AtomicBool::new(false),
            close_once: Once::new(),
            disconnect_once: Once::new(),
            stream: Arc::new(stream),
            shutdown,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            codec,
            scheduler,
            events: ConnectionEvents::default(),
        }))
    }

    /// Process-unique id, assigned from 1 in accept order and never reused within a server run.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Human-readable name, derived from the id at creation (`"Client 3"`).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the session is still up. Once false, stays false.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(SeqCst)
    }

    /// Registers a handler for inbound messages.
    pub fn on_message(&self, handler: impl Fn(&Arc<Self>, &R) + Send + Sync + 'static) {
        self.events.message.subscribe(move |(conn, message)| handler(conn, message));
    }

    /// Registers a handler for the end of the session. Fires exactly once per connection,
    /// strictly after the last message that session delivered.
    pub fn on_disconnected(&self, handler: impl Fn(&Arc<Self>) + Send + Sync + 'static) {
        self.events.disconnected.subscribe(handler);
    }

    /// Registers a handler for I/O and codec failures. An error does not necessarily end the
    /// session: codec rejections are reported and skipped, transport failures are followed by
    /// the disconnect.
    pub fn on_error(&self, handler: impl Fn(&Arc<Self>, &Error) + Send + Sync + 'static) {
        self.events.error.subscribe(move |(conn, error)| handler(conn, error));
    }

    /// Raw event access for the server/client bridges, which forward argument tuples verbatim.
    pub(crate) fn events(&self) -> &ConnectionEvents<R, W> {
        &self.events
    }

    /// Spawns the read and write loops. Called once, right after event subscription.
    pub(crate) fn open(self: &Arc<Self>) -> Result<()> {
        if self.opened.swap(true, SeqCst) {
            return Err(Error::lifecycle(format!("{} is already open", self.name)));
        }
        let queue_rx = antidote(self.queue_rx.lock())
            .take()
            .ok_or_else(|| Error::lifecycle("connection queue already claimed"))?;

        let conn = Arc::clone(self);
        let completed = Arc::clone(self);
        let failed = Arc::clone(self);
        Worker::spawn(
            format!("{} read loop", self.name),
            &self.scheduler,
            move || Self::read_loop(&conn),
            move || completed.notify_disconnect(),
            move |e| failed.report_worker_error(e),
        )?;

        let conn = Arc::clone(self);
        let completed = Arc::clone(self);
        let failed = Arc::clone(self);
        let spawned = Worker::spawn(
            format!("{} write loop", self.name),
            &self.scheduler,
            move || Self::write_loop(&conn, queue_rx),
            move || completed.notify_disconnect(),
            move |e| failed.report_worker_error(e),
        );
        if let Err(e) = spawned {
            // Half-open is worse than closed: let the read loop wind the session down.
            self.close_impl();
            return Err(e);
        }
        Ok(())
    }

    /// Enqueues an outbound message and wakes the write loop. Never blocks; a message pushed at
    /// a dead connection is quietly dropped.
    pub fn push_message(&self, message: W) {
        if !self.is_connected() {
            tracing::trace!(connection = %self.name, "dropping message pushed after close");
            return;
        }
        let _ = self.queue_tx.send(QueueItem::Message(message));
    }

    /// Closes the session: shuts the stream down, which unparks both loops and leads to the
    /// one-shot disconnect notification.
    pub fn close(&self) {
        self.close_impl();
    }

    fn close_impl(&self) {
        self.close_once.call_once(|| {
            self.connected.store(false, SeqCst);
            if let Err(e) = self.shutdown.shutdown() {
                tracing::debug!(connection = %self.name, error = %e, "stream shutdown failed");
            }
            let _ = self.queue_tx.send(QueueItem::Shutdown);
        });
    }

    /// Completion callback of both loops; the `Once` makes whichever loop finishes first the one
    /// that reports, and swallows the other.
    fn notify_disconnect(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        self.disconnect_once.call_once(|| {
            tracing::debug!(connection = %conn.name, "disconnected");
            // Already running on the scheduler (worker callbacks are posted there), so the
            // subscribers are called in place to keep delivery ordered after the last message.
            conn.events.disconnected.invoke(&conn);
        });
    }

    fn report_worker_error(self: &Arc<Self>, error: Error) {
        self.events.error.invoke(&(Arc::clone(self), Arc::new(error)));
    }

    fn read_loop(conn: &Arc<Self>) -> Result<()> {
        loop {
            if !conn.is_connected() {
                return Ok(());
            }
            match codec::read_message(&*conn.stream, &*conn.codec) {
                Ok(Some(message)) => {
                    conn.events.message.emit(&conn.scheduler, (Arc::clone(conn), message));
                }
                Ok(None) => {
                    // Clean end-of-stream; also how our own shutdown surfaces to this loop.
                    conn.close_impl();
                    return Ok(());
                }
                Err(e @ Error::Serialization(_)) => {
                    // The frame arrived intact, its payload didn't decode. Report and keep the
                    // session alive.
                    tracing::warn!(connection = %conn.name, error = %e, "dropping undecodable frame");
                    conn.events.error.emit(&conn.scheduler, (Arc::clone(conn), Arc::new(e)));
                }
                Err(e) => {
                    if conn.is_connected() {
                        tracing::warn!(connection = %conn.name, error = %e, "read loop failed");
                        conn.events.error.emit(&conn.scheduler, (Arc::clone(conn), Arc::new(e)));
                    }
                    conn.close_impl();
                    return Ok(());
                }
            }
        }
    }

    fn write_loop(conn: &Arc<Self>, queue: mpsc::Receiver<QueueItem<W>>) -> Result<()> {
        loop {
            // Blocking on the queue is the wake signal; close pulses it with `Shutdown`.
            let message = match queue.recv() {
                Ok(QueueItem::Message(message)) => message,
                Ok(QueueItem::Shutdown) | Err(_) => return Ok(()),
            };
            if !conn.is_connected() {
                return Ok(());
            }
            if let Err(e) = codec::write_message(&*conn.stream, &*conn.codec, &message) {
                if matches!(e, Error::Serialization(_)) {
                    // This message can't be put on the wire; the session itself is fine.
                    tracing::warn!(connection = %conn.name, error = %e, "dropping unencodable message");
                    conn.events.error.emit(&conn.scheduler, (Arc::clone(conn), Arc::new(e)));
                    continue;
                }
                if conn.is_connected() {
                    tracing::warn!(connection = %conn.name, error = %e, "write loop failed");
                    conn.events.error.emit(&conn.scheduler, (Arc::clone(conn), Arc::new(e)));
                }
                conn.close_impl();
                return Ok(());
            }
        }
    }
}

impl<R, W> fmt::Debug for Connection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("connected", &self.connected.load(SeqCst))
            .finish_non_exhaustive()
    }
}
