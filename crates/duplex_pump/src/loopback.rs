//! In-memory duplex that hands every sent payload back on the receive side.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::duplex::{BoxError, Duplex, Flow, Received, StreamCloser, StreamReceiver, StreamSender};

/// Send half of a loopback channel; `close` ends the receive side once it is
/// drained, and so does dropping the last handle.
pub struct LoopbackSender<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
}

/// Receive half of a loopback channel.
pub struct LoopbackReceiver<T> {
    rx: Mutex<mpsc::Receiver<T>>,
}

/// Bounded loopback channel split into its two halves.
pub fn channel<T: Send + 'static>(capacity: usize) -> (LoopbackSender<T>, LoopbackReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        LoopbackSender {
            tx: Mutex::new(Some(tx)),
        },
        LoopbackReceiver { rx: Mutex::new(rx) },
    )
}

#[async_trait]
impl<T: Send + 'static> StreamSender<T> for LoopbackSender<T> {
    async fn send(&self, payload: T) -> Result<Flow, BoxError> {
        let Some(tx) = self.tx.lock().await.clone() else {
            return Ok(Flow::End);
        };
        match tx.send(payload).await {
            Ok(()) => Ok(Flow::Continue),
            Err(_) => Ok(Flow::End),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StreamCloser for LoopbackSender<T> {
    async fn close(&self) -> Result<Flow, BoxError> {
        self.tx.lock().await.take();
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl<T: Send + 'static> StreamReceiver<T> for LoopbackReceiver<T> {
    async fn recv(&self) -> Result<Received<T>, BoxError> {
        Ok(match self.rx.lock().await.recv().await {
            Some(item) => Received::Item(item),
            None => Received::End,
        })
    }
}

/// A duplex that echoes every decoded record back to the output.
///
/// Only the send side holds the sender, so the receive side ends as soon as
/// the send loop stops, whether it closed cleanly or failed.
pub fn echo<T: Send + 'static>(capacity: usize) -> Duplex<T, T> {
    let (tx, rx) = channel(capacity);
    let tx = Arc::new(tx);
    Duplex::builder()
        .send(tx.clone())
        .close(tx)
        .recv(Arc::new(rx))
        .build()
}
