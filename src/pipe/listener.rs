use crate::{
    error::Result,
    pipe::{LocalStream, PipeName, PipeOptions},
};
use interprocess::local_socket::{prelude::*, ListenerOptions, Name};
#[cfg(unix)]
use interprocess::os::unix::local_socket::ListenerOptionsExt;
use std::io;

/// A bound server-side pipe endpoint.
///
/// Binding and accepting are separate so the caller can decide between the factory's two shapes:
/// create-without-waiting (`bind`) and create-and-await-one-client (`bind` + [`accept`]).
///
/// [`accept`]: PipeListener::accept
#[derive(Debug)]
pub struct PipeListener {
    inner: interprocess::local_socket::Listener,
    name: PipeName,
}

impl PipeListener {
    /// Creates the endpoint under `name` without waiting for anyone to connect.
    ///
    /// A leftover socket file from a crashed process ("corpse socket") holds the name hostage
    /// on Unix; when the bind reports the name as taken but nothing answers on it, the corpse is
    /// unlinked and the bind retried once.
    pub fn bind(name: &PipeName, options: &PipeOptions) -> Result<Self> {
        let local_name = name.to_local_name()?;
        let inner = match Self::bind_once(local_name.clone(), options) {
            #[cfg(unix)]
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && is_corpse(name) => {
                tracing::debug!(name = %name, "unlinking corpse socket");
                std::fs::remove_file(name.socket_path())?;
                Self::bind_once(local_name, options)?
            }
            result => result?,
        };
        Ok(Self { inner, name: name.clone() })
    }

    fn bind_once(
        local_name: Name<'static>,
        options: &PipeOptions,
    ) -> io::Result<interprocess::local_socket::Listener> {
        let _ = options.buffer_size; // advisory; the transport sizes its own buffers
        let mut listener_options = ListenerOptions::new().name(local_name);
        #[cfg(unix)]
        if let Some(mode) = options.mode {
            listener_options = listener_options.mode(mode);
        }
        listener_options.create_sync()
    }

    /// Blocks until exactly one client connects, yielding its stream.
    pub fn accept(&self) -> Result<LocalStream> {
        Ok(self.inner.accept()?)
    }

    /// The name this listener is bound to.
    #[inline]
    pub fn name(&self) -> &PipeName {
        &self.name
    }
}

/// A name is a corpse if its endpoint exists but actively refuses connections.
#[cfg(unix)]
fn is_corpse(name: &PipeName) -> bool {
    let Ok(local_name) = name.to_local_name() else {
        return false;
    };
    match LocalStream::connect(local_name) {
        Err(e) => e.kind() == io::ErrorKind::ConnectionRefused,
        // Someone is genuinely listening; back off and report the original error.
        Ok(_) => false,
    }
}
