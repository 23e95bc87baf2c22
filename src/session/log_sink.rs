//! Append-only session log shared between the pty drain loop and assertion pollers

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe, append-only byte log
///
/// One mutex covers both appends and snapshots, so a reader never observes
/// half of an append and two appends never interleave. Clones share the same
/// buffer.
#[derive(Clone, Default)]
pub struct LogSink {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    buf: Vec<u8>,
    sealed: bool,
    /// Optional on-disk copy for following a session live
    mirror: Option<File>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that also copies every append to `path`
    pub fn with_mirror(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                mirror: Some(file),
                ..Default::default()
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Appends are a single extend; a panicking holder cannot leave a torn buffer
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes atomically with respect to other appends and snapshots
    ///
    /// Fails once the sink has been sealed.
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        if inner.sealed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session log is sealed",
            ));
        }
        inner.buf.extend_from_slice(bytes);
        if let Some(mirror) = inner.mirror.as_mut() {
            if let Err(e) = mirror.write_all(bytes) {
                tracing::warn!(error = %e, "session log mirror write failed, disabling mirror");
                inner.mirror = None;
            }
        }
        Ok(())
    }

    /// Copy of everything appended so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().buf.clone()
    }

    /// Snapshot decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock().buf).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting writes; the contents stay readable
    pub fn seal(&self) {
        let mut inner = self.lock();
        inner.sealed = true;
        if let Some(mirror) = inner.mirror.as_mut() {
            let _ = mirror.flush();
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().mirror.as_mut() {
            Some(mirror) => mirror.flush(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LogSink")
            .field("len", &inner.buf.len())
            .field("sealed", &inner.sealed)
            .finish()
    }
}
