use crate::error::{Error, Result};
use interprocess::local_socket::Name;
use std::fmt;
#[cfg(unix)]
use {
    interprocess::local_socket::{GenericFilePath, ToFsName},
    std::path::PathBuf,
};
#[cfg(windows)]
use {
    interprocess::local_socket::{GenericNamespaced, ToNsName},
    std::path::Path,
};

/// A logical pipe name, valid on every supported platform.
///
/// The name is what both sides of a deployment agree on, such as `"chat"`, and what the
/// server embeds per-connection counters into (`"chat_1"`, `"chat_2"`, …). Resolution to an actual
/// endpoint is platform-specific: a socket file under the OS temporary directory on Unix, a
/// `\\.\pipe\` entry on Windows. Both renditions are visible to the filesystem API, which is what
/// makes the handshake's "wait until this name exists" probe possible.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipeName {
    raw: String,
}

impl PipeName {
    /// Validates and wraps a logical pipe name.
    ///
    /// Names must be non-empty and free of path separators and NUL, since they are spliced into
    /// both filesystem paths and the Windows pipe namespace.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::lifecycle("pipe name must not be empty"));
        }
        if raw.contains(['/', '\\', '\0']) {
            return Err(Error::lifecycle(format!(
                "pipe name {raw:?} contains a path separator or NUL",
            )));
        }
        Ok(Self { raw })
    }

    /// The logical name as agreed between server and client.
    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Derives the per-connection name `<base>_<n>` the server allocates during the handshake.
    pub fn child(&self, n: u64) -> Self {
        Self { raw: format!("{}_{n}", self.raw) }
    }

    /// Non-blocking probe for whether an endpoint with this name currently exists.
    ///
    /// Existence does not imply anyone is accepting (a stale Unix socket file keeps its name
    /// alive), so connecting may still fail after a positive probe.
    pub fn exists(&self) -> bool {
        #[cfg(unix)]
        {
            self.socket_path().exists()
        }
        #[cfg(windows)]
        {
            Path::new(&format!(r"\\.\pipe\{}", self.raw)).exists()
        }
    }

    #[cfg(unix)]
    pub(crate) fn socket_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}.sock", self.raw))
    }

    /// Resolves the logical name into the transport's name type.
    pub(crate) fn to_local_name(&self) -> Result<Name<'static>> {
        #[cfg(unix)]
        {
            Ok(self.socket_path().to_fs_name::<GenericFilePath>()?)
        }
        #[cfg(windows)]
        {
            Ok(self.raw.clone().to_ns_name::<GenericNamespaced>()?)
        }
    }
}

impl fmt::Display for PipeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for PipeName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Transport options passed through to endpoint creation.
///
/// Both fields are opaque to the messaging engine itself.
#[derive(Clone, Debug, Default)]
pub struct PipeOptions {
    /// Advisory per-endpoint buffer size. The local-socket transport sizes its own buffers, so
    /// this is currently a hint carried for API compatibility rather than a hard setting.
    pub buffer_size: Option<usize>,
    /// Filesystem mode bits for the socket file, the Unix rendition of an access-control
    /// descriptor.
    #[cfg(unix)]
    pub mode: Option<libc::mode_t>,
}

impl PipeOptions {
    /// Options with platform defaults everywhere.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_names_embed_the_counter() {
        let name = PipeName::new("chat").unwrap();
        assert_eq!(name.child(1).raw(), "chat_1");
        assert_eq!(name.child(42).raw(), "chat_42");
        // Children of children keep appending, matching the server's allocation scheme.
        assert_eq!(name.child(1).child(2).raw(), "chat_1_2");
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(PipeName::new("").is_err());
        assert!(PipeName::new("a/b").is_err());
        assert!(PipeName::new(r"a\b").is_err());
        assert!(PipeName::new("a\0b").is_err());
        assert!(PipeName::new("plain-name_1").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn unix_names_resolve_under_the_temp_dir() {
        let name = PipeName::new("pipemux-unit").unwrap();
        let path = name.socket_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(path.extension().unwrap(), "sock");
    }

    #[test]
    fn nonexistent_names_probe_false() {
        assert!(!PipeName::new("pipemux-definitely-not-bound").unwrap().exists());
    }
}
