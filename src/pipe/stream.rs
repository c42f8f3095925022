use crate::{
    error::{Error, Result},
    pipe::{LocalStream, PipeName},
};
use interprocess::local_socket::prelude::*;
use std::{
    io,
    thread,
    time::{Duration, Instant},
};

/// How a client-side connect waits for the server.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Sleep between existence probes while the name has not been created yet.
    pub poll_interval: Duration,
    /// Once the name exists, how long connect attempts may keep failing with "nobody accepting"
    /// before the whole operation fails. Covers the race where the probe sees a name the server
    /// is just rebinding between two accepts.
    pub connect_budget: Duration,
    /// Overall bound on the operation, covering the existence poll and the connect retries
    /// alike. `None` polls forever, which is what a client waiting for its server to come up
    /// wants.
    pub deadline: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            connect_budget: Duration::from_millis(1000),
            deadline: None,
        }
    }
}

impl ConnectOptions {
    /// Defaults with an overall deadline, for callers that cannot afford to poll forever.
    pub fn bounded(deadline: Duration) -> Self {
        Self { deadline: Some(deadline), ..Self::default() }
    }
}

/// Connects to `name`, spin-waiting for it to exist first.
///
/// This is the client half of the factory: probe until the endpoint name appears, then open a
/// duplex stream within the connect budget.
pub(crate) fn connect(name: &PipeName, options: &ConnectOptions) -> Result<LocalStream> {
    let started = Instant::now();
    loop {
        if name.exists() {
            return connect_within_budget(name, options, started);
        }
        if let Some(deadline) = options.deadline {
            if started.elapsed() >= deadline {
                return Err(Error::ConnectTimeout(deadline));
            }
        }
        thread::sleep(options.poll_interval);
    }
}

/// Retries "nobody accepting" failures under both clocks: the per-connect budget and, when set,
/// the deadline of the operation that started back at `operation_start`. Whichever runs out
/// first ends the attempt.
fn connect_within_budget(
    name: &PipeName,
    options: &ConnectOptions,
    operation_start: Instant,
) -> Result<LocalStream> {
    let budget_start = Instant::now();
    loop {
        match LocalStream::connect(name.to_local_name()?) {
            Ok(stream) => return Ok(stream),
            Err(e) if is_nobody_accepting(&e) => {
                if budget_start.elapsed() >= options.connect_budget {
                    return Err(Error::ConnectTimeout(options.connect_budget));
                }
                if let Some(deadline) = options.deadline {
                    if operation_start.elapsed() >= deadline {
                        return Err(Error::ConnectTimeout(deadline));
                    }
                }
                thread::sleep(options.poll_interval);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Errors that mean "the endpoint is not (yet) accepting", which the connect budget absorbs:
/// the name vanished between probe and connect, nobody is listening behind it, or every pipe
/// instance is momentarily busy.
fn is_nobody_accepting(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused) {
        return true;
    }
    #[cfg(windows)]
    {
        const ERROR_PIPE_BUSY: i32 = 231;
        if e.raw_os_error() == Some(ERROR_PIPE_BUSY) {
            return true;
        }
    }
    false
}

/// Unblocks a read parked on a stream from another thread.
///
/// Captured from the stream before it is handed to the connection loops; the handle stays valid
/// for as long as the connection holds the stream alive.
#[derive(Debug)]
pub(crate) struct ShutdownHandle {
    #[cfg(unix)]
    fd: std::os::fd::OwnedFd,
    #[cfg(windows)]
    handle: isize,
}

#[cfg(unix)]
impl ShutdownHandle {
    pub(crate) fn for_stream(stream: &LocalStream) -> io::Result<Self> {
        use std::os::fd::AsFd;
        // The stream enum has exactly one variant per platform and does not forward the fd
        // traits itself.
        let fd = match stream {
            LocalStream::UdSocket(uds) => uds.as_fd(),
        };
        // A dup shares the socket, so shutdown through it reaches reads parked on the original.
        Ok(Self { fd: fd.try_clone_to_owned()? })
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        use std::os::fd::AsRawFd;
        let rc = unsafe { libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_RDWR) };
        if rc == 0 {
            return Ok(());
        }
        match io::Error::last_os_error() {
            // The peer got there first; the loops will observe EOF on their own.
            e if e.raw_os_error() == Some(libc::ENOTCONN) => Ok(()),
            e => Err(e),
        }
    }
}

#[cfg(windows)]
impl ShutdownHandle {
    pub(crate) fn for_stream(stream: &LocalStream) -> io::Result<Self> {
        use std::os::windows::io::{AsHandle, AsRawHandle};
        let LocalStream::NamedPipe(pipe) = stream;
        // The named-pipe wrapper only exposes the safe `AsHandle`; the raw value comes off the
        // borrowed handle.
        Ok(Self { handle: pipe.as_handle().as_raw_handle() as isize })
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        use windows_sys::Win32::{Foundation::ERROR_NOT_FOUND, System::IO::CancelIoEx};
        let ok = unsafe { CancelIoEx(self.handle as _, std::ptr::null()) };
        if ok != 0 {
            return Ok(());
        }
        match io::Error::last_os_error() {
            // No I/O was in flight; nothing to cancel.
            e if e.raw_os_error() == Some(ERROR_NOT_FOUND as i32) => Ok(()),
            e => Err(e),
        }
    }
}
