use crate::{
    codec::{self, Bincode, Codec},
    connection::Connection,
    error::{Error, Result},
    event::Event,
    misc::{antidote, Latch},
    pipe::{self, ConnectOptions, PipeListener, PipeName, PipeOptions},
    scheduler::{InlineScheduler, Scheduler},
    worker::Worker,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

/// Per-phase budget of the shutdown sequence: the wake-up dummy's two connects and the wait for
/// the listener to acknowledge the stop.
const SHUTDOWN_PHASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for a [`Server`].
pub struct ServerOptions<R, W = R> {
    name: PipeName,
    pipe: PipeOptions,
    codec: Arc<dyn Codec<R, W>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<R, W> ServerOptions<R, W>
where
    R: DeserializeOwned + Send + 'static,
    W: Serialize + Send + 'static,
{
    /// Options with the default Bincode codec and inline callback delivery.
    pub fn new(name: PipeName) -> Self {
        Self {
            name,
            pipe: PipeOptions::new(),
            codec: Arc::new(Bincode),
            scheduler: Arc::new(InlineScheduler),
        }
    }
}

impl<R: Send + 'static, W: Send + 'static> ServerOptions<R, W> {
    /// Options with an application-provided codec; no Serde bounds apply.
    pub fn with_codec(name: PipeName, codec: Arc<dyn Codec<R, W>>) -> Self {
        Self { name, pipe: PipeOptions::new(), codec, scheduler: Arc::new(InlineScheduler) }
    }

    /// Sets the transport options passed through to every endpoint the server creates.
    pub fn pipe_options(mut self, pipe: PipeOptions) -> Self {
        self.pipe = pipe;
        self
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

    /// Builds the server. No I/O happens until [`Server::start`].
    pub fn create(self) -> Server<R, W> {
        Server {
            shared: Arc::new(Shared {
                name: self.name,
                pipe_options: self.pipe,
                codec: self.codec,
                scheduler: self.scheduler,
                next_pipe_id: AtomicU64::new(0),
                registry: Mutex::new(Vec::new()),
                should_keep_running: AtomicBool::new(false),
                is_running: AtomicBool::new(false),
                stopped: Latch::new(),
                events: ServerEvents::default(),
            }),
        }
    }
}

/// A multiplexing pipe server.
///
/// The server listens on one well-known name and serves any number of concurrent clients, each on
/// a private data pipe negotiated by a two-stage handshake: the client connects to the well-known
/// name, receives a freshly allocated per-connection pipe name in a single frame, and moves over
/// to it. Every accepted session becomes a [`Connection`] with its own read and write loops.
///
/// `R` is the message type received from clients, `W` the type sent to them. Subscribe to events
/// before calling [`start`](Server::start); cloning the server clones a handle to the same
/// instance.
///
/// ```no_run
/// use pipemux::{PipeName, Server};
///
/// fn main() -> pipemux::Result<()> {
///     let server: Server<String> = Server::new(PipeName::new("demo")?);
///     server.on_client_message(|conn, message: &String| {
///         println!("{} said {message}", conn.name());
///     });
///     server.start()?;
///     // ... run until done ...
///     server.stop();
///     Ok(())
/// }
/// ```
pub struct Server<R, W = R> {
    shared: Arc<Shared<R, W>>,
}

impl<R, W> Clone for Server<R, W> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

struct Shared<R, W> {
    name: PipeName,
    pipe_options: PipeOptions,
    codec: Arc<dyn Codec<R, W>>,
    scheduler: Arc<dyn Scheduler>,
    /// Feeds both connection ids and data-pipe names, so the two always agree.
    next_pipe_id: AtomicU64,
    registry: Mutex<Vec<Arc<Connection<R, W>>>>,
    should_keep_running: AtomicBool,
    is_running: AtomicBool,
    stopped: Latch,
    events: ServerEvents<R, W>,
}

struct ServerEvents<R, W> {
    client_connected: Event<Arc<Connection<R, W>>>,
    client_disconnected: Event<Option<Arc<Connection<R, W>>>>,
    client_message: Event<(Arc<Connection<R, W>>, R)>,
    error: Event<(Option<Arc<Connection<R, W>>>, Arc<Error>)>,
}

impl<R, W> Default for ServerEvents<R, W> {
    fn default() -> Self {
        Self {
            client_connected: Event::default(),
            client_disconnected: Event::default(),
            client_message: Event::default(),
            error: Event::default(),
        }
    }
}

impl<R, W> Server<R, W>
where
    R: DeserializeOwned + Send + 'static,
    W: Serialize + Send + 'static,
{
    /// A server with default options. Equivalent to `ServerOptions::new(name).create()`.
    pub fn new(name: PipeName) -> Self {
        ServerOptions::new(name).create()
    }
}

impl<R: Send + 'static, W: Send + 'static> Server<R, W> {
    /// The well-known name this server listens on.
    pub fn name(&self) -> &PipeName {
        &self.shared.name
    }

    /// Whether the listener loop is currently alive.
    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(SeqCst)
    }

    /// Registers a handler for newly accepted clients.
    pub fn on_client_connected(
        &self,
        handler: impl Fn(&Arc<Connection<R, W>>) + Send + Sync + 'static,
    ) {
        self.shared.events.client_connected.subscribe(handler);
    }

    /// Registers a handler for departed clients. `None` means a handshake failed before a
    /// connection came to exist.
    pub fn on_client_disconnected(
        &self,
        handler: impl Fn(Option<&Arc<Connection<R, W>>>) + Send + Sync + 'static,
    ) {
        self.shared.events.client_disconnected.subscribe(move |conn| handler(conn.as_ref()));
    }

    /// Registers a handler for messages arriving from any client.
    pub fn on_client_message(
        &self,
        handler: impl Fn(&Arc<Connection<R, W>>, &R) + Send + Sync + 'static,
    ) {
        self.shared.events.client_message.subscribe(move |(conn, message)| {
            handler(conn, message);
        });
    }

    /// Registers a handler for connection-level failures. The connection is absent for errors
    /// not attributable to one session.
    pub fn on_error(
        &self,
        handler: impl Fn(Option<&Arc<Connection<R, W>>>, &Error) + Send + Sync + 'static,
    ) {
        self.shared.events.error.subscribe(move |(conn, error)| handler(conn.as_ref(), error));
    }

    /// Starts the listener loop on a background thread and returns immediately.
    pub fn start(&self) -> Result<()> {
        if self.shared.should_keep_running.swap(true, SeqCst) {
            return Err(Error::lifecycle("server is already running"));
        }
        if self.shared.is_running.load(SeqCst) {
            self.shared.should_keep_running.store(false, SeqCst);
            return Err(Error::lifecycle("server is still winding down a previous run"));
        }
        self.shared.stopped.reset();

        let shared = Arc::clone(&self.shared);
        let spawned = Worker::spawn(
            format!("{} listener", self.shared.name),
            &self.shared.scheduler,
            move || Shared::listen_sync(&shared),
            || {},
            |e| tracing::error!(error = %e, "listener worker failed"),
        );
        if let Err(e) = spawned {
            self.shared.should_keep_running.store(false, SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Stops the server: closes every live connection and unblocks the listener.
    ///
    /// A listener parked in accept cannot be interrupted by a flag, so the stop sequence runs a
    /// throwaway client through a complete handshake to wake it, then waits (bounded) for the
    /// loop to acknowledge. Returns even if the listener cannot be woken; that is logged.
    /// Idempotent.
    pub fn stop(&self) {
        self.shared.should_keep_running.store(false, SeqCst);
        for connection in self.connections() {
            connection.close();
        }
        if self.shared.is_running.load(SeqCst) {
            if let Err(e) = self.wake_listener() {
                tracing::debug!(error = %e, "listener wake-up handshake did not complete");
            }
            if !self.shared.stopped.wait(Some(SHUTDOWN_PHASE_TIMEOUT)) {
                tracing::warn!(name = %self.shared.name, "listener did not acknowledge the stop in time");
            }
        }
        // The wake-up dummy registers like any other client; sweep whatever is left.
        for connection in self.connections() {
            connection.close();
        }
    }

    /// Runs one complete client handshake against our own well-known name, with every phase
    /// bounded, purely to get the accept call to return.
    fn wake_listener(&self) -> Result<()> {
        let options = ConnectOptions::bounded(SHUTDOWN_PHASE_TIMEOUT);
        let mut handshake = pipe::connect(&self.shared.name, &options)?;
        let data_name = codec::read_handshake(&mut handshake)?;
        drop(handshake);
        let data = pipe::connect(&PipeName::new(data_name)?, &options)?;
        drop(data);
        Ok(())
    }

    /// Sends a message to every connected client.
    pub fn push_message(&self, message: &W)
    where
        W: Clone,
    {
        for connection in self.connections() {
            connection.push_message(message.clone());
        }
    }

    /// Sends a message to the client with the given id, if connected.
    pub fn push_message_to(&self, message: W, id: u64) {
        if let Some(connection) = self.connections().into_iter().find(|c| c.id() == id) {
            connection.push_message(message);
        }
    }

    /// Sends a message to every client whose id is in `ids`.
    pub fn push_message_to_ids(&self, message: &W, ids: &[u64])
    where
        W: Clone,
    {
        for connection in self.connections() {
            if ids.contains(&connection.id()) {
                connection.push_message(message.clone());
            }
        }
    }

    /// Sends a message to the client with the given name, if connected.
    pub fn push_message_to_name(&self, message: W, name: &str) {
        if let Some(connection) = self.connections().into_iter().find(|c| c.name() == name) {
            connection.push_message(message);
        }
    }

    /// Sends a message to every client whose name is in `names`.
    pub fn push_message_to_names(&self, message: &W, names: &[impl AsRef<str>])
    where
        W: Clone,
    {
        for connection in self.connections() {
            if names.iter().any(|n| n.as_ref() == connection.name()) {
                connection.push_message(message.clone());
            }
        }
    }

    /// Snapshot of the currently registered connections, in no particular order.
    pub fn connections(&self) -> Vec<Arc<Connection<R, W>>> {
        antidote(self.shared.registry.lock()).clone()
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        antidote(self.shared.registry.lock()).len()
    }
}

impl<R: Send + 'static, W: Send + 'static> Shared<R, W> {
    fn listen_sync(shared: &Arc<Self>) -> Result<()> {
        shared.is_running.store(true, SeqCst);
        tracing::debug!(name = %shared.name, "listener started");
        while shared.should_keep_running.load(SeqCst) {
            if let Err(e) = Self::wait_for_connection(shared) {
                tracing::error!(name = %shared.name, error = %e, "handshake failed");
                shared.events.client_disconnected.emit(&shared.scheduler, None);
            }
        }
        shared.is_running.store(false, SeqCst);
        shared.stopped.pulse();
        tracing::debug!(name = %shared.name, "listener exited");
        Ok(())
    }

    /// One accept: allocate a data pipe name, rendezvous on the well-known name, hand the client
    /// its private name, accept it there and promote the session to a full connection.
    ///
    /// On error both endpoints are released on the way out and the listener resumes; a client
    /// that failed mid-handshake costs nothing but a skipped id.
    fn wait_for_connection(shared: &Arc<Self>) -> Result<()> {
        let id = shared.next_pipe_id.fetch_add(1, SeqCst) + 1;
        let data_name = shared.name.child(id);

        let handshake = PipeListener::bind(&shared.name, &shared.pipe_options)?;
        let mut handshake_stream = handshake.accept()?;
        codec::write_handshake(&mut handshake_stream, data_name.raw())?;
        drop(handshake_stream);
        drop(handshake);

        let data_listener = PipeListener::bind(&data_name, &shared.pipe_options)?;
        let data_stream = data_listener.accept()?;
        drop(data_listener);

        let connection =
            Connection::new(id, data_stream, Arc::clone(&shared.codec), Arc::clone(&shared.scheduler))?;
        Self::bridge(shared, &connection);
        connection.open()?;
        antidote(shared.registry.lock()).push(Arc::clone(&connection));
        tracing::debug!(name = %shared.name, connection = %connection.name(), "client connected");
        shared.events.client_connected.emit(&shared.scheduler, connection);
        Ok(())
    }

    /// Wires a connection's events into the server's. The bridges hold a weak server reference:
    /// the server owns the connection, never the other way around.
    fn bridge(shared: &Arc<Self>, connection: &Arc<Connection<R, W>>) {
        let weak = Arc::downgrade(shared);
        connection.events().message.subscribe(move |args| {
            if let Some(shared) = weak.upgrade() {
                shared.events.client_message.invoke(args);
            }
        });

        let weak = Arc::downgrade(shared);
        connection.events().disconnected.subscribe(move |conn| {
            if let Some(shared) = Weak::upgrade(&weak) {
                antidote(shared.registry.lock()).retain(|c| c.id() != conn.id());
                shared.events.client_disconnected.invoke(&Some(Arc::clone(conn)));
            }
        });

        let weak = Arc::downgrade(shared);
        connection.events().error.subscribe(move |(conn, error)| {
            if let Some(shared) = weak.upgrade() {
                shared.events.error.invoke(&(Some(Arc::clone(conn)), Arc::clone(error)));
            }
        });
    }
}

impl<R, W> fmt::Debug for Server<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.shared.name)
            .field("running", &self.shared.is_running.load(SeqCst))
            .finish_non_exhaustive()
    }
}
