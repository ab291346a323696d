use std::io;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::trace;

/// Single-character events written to the diagnostics stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Marker {
    /// `^` a payload is being sent.
    Sent,
    /// `v` a result was received.
    Received,
    /// `$` the input stream is exhausted.
    InputEnd,
    /// `#` the duplex reported end of stream.
    Closed,
    /// `!` a send call failed.
    SendFailed,
    /// `?` an input record could not be decoded.
    DecodeFailed,
    /// Trailing newline once both loops have finished.
    SessionEnd,
}

impl Marker {
    pub fn as_char(self) -> char {
        match self {
            Marker::Sent => '^',
            Marker::Received => 'v',
            Marker::InputEnd => '$',
            Marker::Closed => '#',
            Marker::SendFailed => '!',
            Marker::DecodeFailed => '?',
            Marker::SessionEnd => '\n',
        }
    }
}

#[derive(Debug)]
enum Event {
    Marker(Marker),
    Report(String),
}

/// Cloneable handle feeding a single diagnostics writer task.
///
/// Markers are only forwarded when verbose; reports are always forwarded.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: mpsc::UnboundedSender<Event>,
    verbose: bool,
}

impl Progress {
    /// Spawns the writer task. It finishes once every clone of the handle is dropped.
    pub fn spawn<W>(sink: W, verbose: bool) -> (Self, JoinHandle<io::Result<()>>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_diagnostics(sink, rx));
        (
            Self { tx, verbose },
            handle,
        )
    }

    pub fn mark(&self, marker: Marker) {
        trace!(marker = ?marker, "pump event");
        if !self.verbose {
            return;
        }
        let _ = self.tx.send(Event::Marker(marker));
    }

    /// Writes one line of text to the diagnostics stream.
    pub fn report(&self, message: impl Into<String>) {
        let _ = self.tx.send(Event::Report(message.into()));
    }
}

async fn write_diagnostics<W>(mut sink: W, mut rx: mpsc::UnboundedReceiver<Event>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        match event {
            Event::Marker(marker) => {
                let mut buf = [0u8; 4];
                let text = marker.as_char().encode_utf8(&mut buf);
                sink.write_all(text.as_bytes()).await?;
            }
            Event::Report(message) => {
                sink.write_all(message.as_bytes()).await?;
                sink.write_all(b"\n").await?;
            }
        }
        sink.flush().await?;
    }
    sink.flush().await
}
