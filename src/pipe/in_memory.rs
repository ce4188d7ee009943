use std::io;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes};
use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One write's worth of bytes in flight. The ack fires once the reader has
/// fully consumed the data, which is what makes the pipe a rendezvous.
struct Chunk {
    data: Bytes,
    ack: oneshot::Sender<()>,
}

/// Terminal state of a pipe half. Set at most once.
#[derive(Clone)]
enum Terminal {
    Clean,
    Errored { kind: io::ErrorKind, message: String },
}

impl Terminal {
    fn from_error(err: &io::Error) -> Self {
        Terminal::Errored {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    fn to_error(&self) -> Option<io::Error> {
        match self {
            Terminal::Clean => None,
            Terminal::Errored { kind, message } => Some(io::Error::new(*kind, message.clone())),
        }
    }
}

struct Shared {
    write_end: Mutex<Option<Terminal>>,
    read_end: Mutex<Option<Terminal>>,
}

impl Shared {
    fn seal_write(&self, terminal: Terminal) {
        let mut end = self.write_end.lock().unwrap();
        if end.is_none() {
            *end = Some(terminal);
        }
    }

    fn seal_read(&self, terminal: Terminal) {
        let mut end = self.read_end.lock().unwrap();
        if end.is_none() {
            *end = Some(terminal);
        }
    }

    /// Error delivered to readers once the write half is gone, if any.
    fn write_error(&self) -> Option<io::Error> {
        self.write_end
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Terminal::to_error)
    }

    /// Error delivered to writers once the read half is gone.
    fn read_error(&self) -> io::Error {
        self.read_end
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Terminal::to_error)
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe read end closed"))
    }
}

fn closed_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "read/write on closed pipe")
}

fn cancelled() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "pipe operation cancelled")
}

/// Create a new in-memory pipe. The writer hands bytes to the reader through
/// a single-slot rendezvous channel; `cancel` wakes any blocked operation on
/// either half.
pub fn in_memory(cancel: CancellationToken) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    let shared = Arc::new(Shared {
        write_end: Mutex::new(None),
        read_end: Mutex::new(None),
    });

    let writer = PipeWriter {
        tx: Some(tx),
        shared: Arc::clone(&shared),
        cancel: cancel.clone(),
    };
    let reader = PipeReader {
        rx,
        current: None,
        shared,
        cancel,
        closed: false,
    };

    (writer, reader)
}

/// Write half of an in-memory pipe.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Chunk>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl PipeWriter {
    /// Write `buf` into the pipe, completing only once the read side has
    /// consumed every byte. Fails with the read half's close error (or
    /// `BrokenPipe` if it closed cleanly), or with `Interrupted` on
    /// cancellation.
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = match &self.tx {
            Some(tx) => tx.clone(),
            None => return Err(closed_pipe()),
        };
        if buf.is_empty() {
            return Ok(0);
        }

        let (ack, ack_rx) = oneshot::channel();
        let chunk = Chunk {
            data: Bytes::copy_from_slice(buf),
            ack,
        };

        tokio::select! {
            sent = tx.send(chunk) => {
                if sent.is_err() {
                    return Err(self.shared.read_error());
                }
            }
            _ = self.cancel.cancelled() => return Err(cancelled()),
        }

        tokio::select! {
            acked = ack_rx => match acked {
                Ok(()) => Ok(buf.len()),
                Err(_) => Err(self.shared.read_error()),
            },
            _ = self.cancel.cancelled() => Err(cancelled()),
        }
    }

    /// Blocking variant of [`write`](Self::write) for producers running on a
    /// blocking thread. Must not be called from an async context.
    pub fn write_blocking(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tx = match &self.tx {
            Some(tx) => tx.clone(),
            None => return Err(closed_pipe()),
        };
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let (ack, ack_rx) = oneshot::channel();
        let chunk = Chunk {
            data: Bytes::copy_from_slice(buf),
            ack,
        };

        if tx.blocking_send(chunk).is_err() {
            return Err(self.shared.read_error());
        }
        match ack_rx.blocking_recv() {
            Ok(()) => Ok(buf.len()),
            Err(_) => Err(self.shared.read_error()),
        }
    }

    /// Close the write half cleanly; the reader observes end-of-data once the
    /// in-flight chunk, if any, is drained.
    pub fn close(&mut self) {
        self.shared.seal_write(Terminal::Clean);
        self.tx.take();
    }

    /// Close the write half carrying `err`; the reader observes `err` in
    /// place of end-of-data, on every subsequent read.
    pub fn close_with_error(&mut self, err: io::Error) {
        self.shared.seal_write(Terminal::from_error(&err));
        self.tx.take();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read half of an in-memory pipe.
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    current: Option<Inflight>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    closed: bool,
}

/// A received chunk being served to read calls. The ack is held until the
/// last byte is handed out so the writer stays blocked until then.
struct Inflight {
    data: Bytes,
    ack: Option<oneshot::Sender<()>>,
}

impl Inflight {
    fn acknowledge(&mut self) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(());
        }
    }
}

impl PipeReader {
    /// Read up to `buf.len()` bytes. Returns `Ok(0)` for end-of-data after a
    /// clean write close; a write close carrying an error yields that error
    /// instead, on this and every subsequent read.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_pipe());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(inflight) = &mut self.current {
                let n = inflight.data.len().min(buf.len());
                buf[..n].copy_from_slice(&inflight.data[..n]);
                inflight.data.advance(n);
                if inflight.data.is_empty() {
                    inflight.acknowledge();
                    self.current = None;
                }
                return Ok(n);
            }

            match self.recv_chunk().await? {
                Some(inflight) => self.current = Some(inflight),
                None => return Ok(0),
            }
        }
    }

    /// Receive one whole chunk, acknowledging it immediately: handing the
    /// bytes to the caller counts as consumption. `Ok(None)` is end-of-data.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.closed {
            return Err(closed_pipe());
        }

        if let Some(mut inflight) = self.current.take() {
            inflight.acknowledge();
            return Ok(Some(inflight.data));
        }

        match self.recv_chunk().await? {
            Some(mut inflight) => {
                inflight.acknowledge();
                Ok(Some(inflight.data))
            }
            None => Ok(None),
        }
    }

    async fn recv_chunk(&mut self) -> io::Result<Option<Inflight>> {
        tokio::select! {
            chunk = self.rx.recv() => match chunk {
                Some(Chunk { data, ack }) => Ok(Some(Inflight { data, ack: Some(ack) })),
                None => match self.shared.write_error() {
                    Some(err) => Err(err),
                    None => Ok(None),
                },
            },
            _ = self.cancel.cancelled() => Err(cancelled()),
        }
    }

    /// Convert the read half into a stream of chunks suitable for a streaming
    /// HTTP request body. The stream ends after end-of-data or after yielding
    /// one error.
    pub fn into_byte_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_chunk().await {
                Ok(Some(data)) => Some((Ok(data), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Close the read half cleanly; a blocked or subsequent write fails with
    /// `BrokenPipe`.
    pub fn close(&mut self) {
        self.terminate(Terminal::Clean);
    }

    /// Close the read half carrying `err`; a blocked or subsequent write
    /// fails with `err`.
    pub fn close_with_error(&mut self, err: io::Error) {
        self.terminate(Terminal::from_error(&err));
    }

    fn terminate(&mut self, terminal: Terminal) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shared.seal_read(terminal);
        // Dropping the in-flight chunk and draining the channel releases the
        // acks, which wakes any writer blocked on them.
        self.current.take();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.close();
    }
}

/// `std::io::Write` adapter over a [`PipeWriter`] for synchronous encoders
/// running on a blocking thread.
pub struct BlockingWriter {
    inner: PipeWriter,
}

impl BlockingWriter {
    pub fn new(inner: PipeWriter) -> Self {
        Self { inner }
    }

    /// Hand the pipe half back, e.g. to close it with an error.
    pub fn into_inner(self) -> PipeWriter {
        self.inner
    }
}

impl io::Write for BlockingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_blocking(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
