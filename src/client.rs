use crate::{
    codec::{self, Bincode, Codec},
    connection::Connection,
    error::{Error, Result},
    event::Event,
    misc::{antidote, Latch},
    pipe::{self, ConnectOptions, PipeName},
    scheduler::{InlineScheduler, Scheduler},
    worker::Worker,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

/// Configuration for a [`Client`].
pub struct ClientOptions<R, W = R> {
    name: PipeName,
    codec: Arc<dyn Codec<R, W>>,
    scheduler: Arc<dyn Scheduler>,
    auto_reconnect: bool,
    auto_reconnect_delay: Duration,
}

impl<R, W> ClientOptions<R, W>
where
    R: DeserializeOwned + Send + 'static,
    W: Serialize + Send + 'static,
{
    /// Options with the default Bincode codec and inline callback delivery.
    pub fn new(name: PipeName) -> Self {
        Self {
            name,
            codec: Arc::new(Bincode),
            scheduler: Arc::new(InlineScheduler),
            auto_reconnect: true,
            auto_reconnect_delay: Duration::ZERO,
        }
    }
}

impl<R: Send + 'static, W: Send + 'static> ClientOptions<R, W> {
    /// Options with an application-provided codec; no Serde bounds apply.
    pub fn with_codec(name: PipeName, codec: Arc<dyn Codec<R, W>>) -> Self {
        Self {
            name,
            codec,
            scheduler: Arc::new(InlineScheduler),
            auto_reconnect: true,
            auto_reconnect_delay: Duration::ZERO,
        }
    }

    /// Replaces the codec.
    pub fn codec(mut self, codec: Arc<dyn Codec<R, W>>) -> Self {
        self.codec = codec;
        self
    }

    /// Nominates the scheduler all events are delivered on.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Whether a lost connection is re-established automatically. On by default.
    pub fn auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// How long to wait after a disconnect before reconnecting. Zero by default.
    pub fn auto_reconnect_delay(mut self, delay: Duration) -> Self {
        self.auto_reconnect_delay = delay;
        self
    }

    /// Builds the client. No I/O happens until [`Client::start`].
    pub fn create(self) -> Client<R, W> {
        Client {
            shared: Arc::new(Shared {
                name: self.name,
                codec: self.codec,
                scheduler: self.scheduler,
                connection: Mutex::new(None),
                connected: Latch::new(),
                disconnected: Latch::new(),
                connecting: AtomicBool::new(false),
                auto_reconnect: AtomicBool::new(self.auto_reconnect),
                auto_reconnect_delay_ms: AtomicU64::new(self.auto_reconnect_delay.as_millis() as u64),
                closed_explicitly: AtomicBool::new(false),
                next_connection_id: AtomicU64::new(0),
                events: ClientEvents::default(),
            }),
        }
    }
}

/// A pipe client.
///
/// Connecting runs the two-stage handshake: open the server's well-known name (waiting for it to
/// exist if need be), receive the private data-pipe name in one frame, then move over to the data
/// pipe for the actual session. `R` is the message type received from the server, `W` the type
/// sent to it, mirrored relative to the server's parameters.
///
/// A client owns at most one [`Connection`] at a time. When the session drops without
/// [`stop`](Client::stop) having been called and auto-reconnect is on (the default), exactly one
/// new attempt starts after the configured delay. Cloning the client clones a handle to the same
/// instance.
pub struct Client<R, W = R> {
    shared: Arc<Shared<R, W>>,
}

impl<R, W> Clone for Client<R, W> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

struct Shared<R, W> {
    name: PipeName,
    codec: Arc<dyn Codec<R, W>>,
    scheduler: Arc<dyn Scheduler>,
    connection: Mutex<Option<Arc<Connection<R, W>>>>,
    connected: Latch,
    disconnected: Latch,
    /// Guards against overlapping connection attempts.
    connecting: AtomicBool,
    auto_reconnect: AtomicBool,
    auto_reconnect_delay_ms: AtomicU64,
    closed_explicitly: AtomicBool,
    next_connection_id: AtomicU64,
    events: ClientEvents<R, W>,
}

struct ClientEvents<R, W> {
    message: Event<R>,
    disconnected: Event<()>,
    error: Event<Arc<Error>>,
    _marker: std::marker::PhantomData<fn() -> W>,
}

impl<R, W> Default for ClientEvents<R, W> {
    fn default() -> Self {
        Self {
            message: Event::default(),
            disconnected: Event::default(),
            error: Event::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<R, W> Client<R, W>
where
    R: DeserializeOwned + Send + 'static,
    W: Serialize + Send + 'static,
{
    /// A client with default options. Equivalent to `ClientOptions::new(name).create()`.
    pub fn new(name: PipeName) -> Self {
        ClientOptions::new(name).create()
    }
}

impl<R: Send + 'static, W: Send + 'static> Client<R, W> {
    /// The well-known server name this client connects to.
    pub fn name(&self) -> &PipeName {
        &self.shared.name
    }

    /// Whether a session is currently established.
    pub fn is_connected(&self) -> bool {
        antidote(self.shared.connection.lock())
            .as_ref()
            .is_some_and(|c| c.is_connected())
    }

    /// Turns automatic reconnection on or off at runtime.
    pub fn set_auto_reconnect(&self, auto_reconnect: bool) {
        self.shared.auto_reconnect.store(auto_reconnect, SeqCst);
    }

    /// Changes the delay applied before an automatic reconnection attempt.
    pub fn set_auto_reconnect_delay(&self, delay: Duration) {
        self.shared.auto_reconnect_delay_ms.store(delay.as_millis() as u64, SeqCst);
    }

    /// Registers a handler for messages arriving from the server.
    pub fn on_message(&self, handler: impl Fn(&R) + Send + Sync + 'static) {
        self.shared.events.message.subscribe(handler);
    }

    /// Registers a handler for the end of a session. With auto-reconnect on, a new session may
    /// follow; each established session reports its end exactly once.
    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.shared.events.disconnected.subscribe(move |()| handler());
    }

    /// Registers a handler for connection and handshake failures.
    pub fn on_error(&self, handler: impl Fn(&Error) + Send + Sync + 'static) {
        self.shared.events.error.subscribe(move |error| handler(error));
    }

    /// Starts connecting on a background thread and returns immediately.
    ///
    /// The handshake waits indefinitely for the well-known name to appear, so starting the client
    /// before the server is fine. Use [`wait_for_connection`](Client::wait_for_connection) to
    /// block until the session is up.
    pub fn start(&self) -> Result<()> {
        self.shared.closed_explicitly.store(false, SeqCst);
        Shared::spawn_listen(&self.shared)
    }

    /// Closes the current session and suppresses reconnection.
    pub fn stop(&self) {
        self.shared.closed_explicitly.store(true, SeqCst);
        let connection = antidote(self.shared.connection.lock()).take();
        if let Some(connection) = connection {
            connection.close();
        }
    }

    /// Sends a message to the server. A no-op while disconnected; messages are not queued
    /// across sessions.
    pub fn push_message(&self, message: W) {
        let connection = antidote(self.shared.connection.lock()).clone();
        match connection {
            Some(connection) => connection.push_message(message),
            None => tracing::trace!(name = %self.shared.name, "dropping message pushed while disconnected"),
        }
    }

    /// Blocks until a session is established. Returns `false` on timeout.
    pub fn wait_for_connection(&self, timeout: Option<Duration>) -> bool {
        self.shared.connected.wait(timeout)
    }

    /// Blocks until the current session ends. Returns `false` on timeout.
    pub fn wait_for_disconnection(&self, timeout: Option<Duration>) -> bool {
        self.shared.disconnected.wait(timeout)
    }
}

impl<R: Send + 'static, W: Send + 'static> Shared<R, W> {
    fn spawn_listen(shared: &Arc<Self>) -> Result<()> {
        if shared.connecting.swap(true, SeqCst) {
            return Err(Error::lifecycle("client is already connecting"));
        }
        if antidote(shared.connection.lock()).is_some() {
            shared.connecting.store(false, SeqCst);
            return Err(Error::lifecycle("client is already connected"));
        }

        let worker_shared = Arc::clone(shared);
        let error_shared = Arc::clone(shared);
        let spawned = Worker::spawn(
            format!("{} client listener", shared.name),
            &shared.scheduler,
            move || {
                let result = Self::listen_sync(&worker_shared);
                worker_shared.connecting.store(false, SeqCst);
                result
            },
            || {},
            move |e| {
                tracing::error!(name = %error_shared.name, error = %e, "connection attempt failed");
                error_shared.events.error.invoke(&Arc::new(e));
            },
        );
        if let Err(e) = spawned {
            shared.connecting.store(false, SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Keeps attempting the handshake until a session is up or the client is stopped.
    ///
    /// Waiting for the server to appear is unbounded (a client may legitimately start first),
    /// but it is carved into short bounded attempts so an explicit stop is honored
    /// between them. Losing the rendezvous accept to a concurrent client surfaces as an abrupt
    /// end of the handshake stream and is simply tried again.
    fn listen_sync(shared: &Arc<Self>) -> Result<()> {
        loop {
            if shared.closed_explicitly.load(SeqCst) {
                return Ok(());
            }
            match Self::establish(shared) {
                Ok(()) => return Ok(()),
                Err(e) if handshake_retryable(&e) => {
                    tracing::trace!(name = %shared.name, error = %e, "handshake attempt failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One handshake attempt: rendezvous on the well-known name, learn the private data-pipe
    /// name, establish the session there.
    fn establish(shared: &Arc<Self>) -> Result<()> {
        let rendezvous = ConnectOptions::bounded(Duration::from_millis(250));
        let mut handshake = pipe::connect(&shared.name, &rendezvous)?;
        let data_name = codec::read_handshake(&mut handshake)?;
        drop(handshake);
        tracing::debug!(name = %shared.name, data_pipe = %data_name, "handshake complete");

        let data_stream =
            pipe::connect(&PipeName::new(data_name)?, &ConnectOptions::bounded(Duration::from_secs(2)))?;
        let id = shared.next_connection_id.fetch_add(1, SeqCst) + 1;
        let connection =
            Connection::new(id, data_stream, Arc::clone(&shared.codec), Arc::clone(&shared.scheduler))?;
        Self::bridge(shared, &connection);
        connection.open()?;
        *antidote(shared.connection.lock()) = Some(Arc::clone(&connection));

        // A stop that raced the handshake wins: tear the fresh session down again.
        if shared.closed_explicitly.load(SeqCst) {
            antidote(shared.connection.lock()).take();
            connection.close();
            return Ok(());
        }
        shared.connected.pulse();
        Ok(())
    }

    fn bridge(shared: &Arc<Self>, connection: &Arc<Connection<R, W>>) {
        let weak = Arc::downgrade(shared);
        connection.events().message.subscribe(move |(_, message)| {
            if let Some(shared) = weak.upgrade() {
                shared.events.message.invoke(message);
            }
        });

        let weak = Arc::downgrade(shared);
        connection.events().error.subscribe(move |(_, error)| {
            if let Some(shared) = weak.upgrade() {
                shared.events.error.invoke(error);
            }
        });

        let weak = Arc::downgrade(shared);
        connection.events().disconnected.subscribe(move |_| {
            if let Some(shared) = weak.upgrade() {
                Self::handle_disconnect(&shared);
            }
        });
    }

    /// Runs on the scheduler when the session ends, however it ends.
    fn handle_disconnect(shared: &Arc<Self>) {
        antidote(shared.connection.lock()).take();
        shared.events.disconnected.invoke(&());
        shared.disconnected.pulse();

        if shared.auto_reconnect.load(SeqCst) && !shared.closed_explicitly.load(SeqCst) {
            let delay = Duration::from_millis(shared.auto_reconnect_delay_ms.load(SeqCst));
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            tracing::debug!(name = %shared.name, "reconnecting");
            if let Err(e) = Self::spawn_listen(shared) {
                tracing::error!(name = %shared.name, error = %e, "reconnect attempt failed to launch");
            }
        }
    }
}

/// Handshake failures worth simply trying again: the rendezvous attempt timed out (the server
/// is not up yet), or the stream died before the name arrived (another client won that accept).
fn handshake_retryable(error: &Error) -> bool {
    match error {
        Error::ConnectTimeout(_) => true,
        Error::Transport(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

impl<R, W> fmt::Debug for Client<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.shared.name)
            .field("connected", &antidote(self.shared.connection.lock()).is_some())
            .finish_non_exhaustive()
    }
}
