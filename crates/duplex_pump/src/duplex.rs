use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::probe::{probe, Capabilities, SendMode};

/// Error type returned by duplex operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a successful send or close call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Flow {
    /// The call was accepted; the pump may keep going.
    Continue,
    /// The remote side will accept no more input.
    End,
}

/// Outcome of a successful receive call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Received<U> {
    Item(U),
    /// No more results will be produced.
    End,
}

/// Accepts one payload per call.
///
/// The same trait backs both the repeatable `send` slot and the final
/// `send_and_close` slot of a [`DuplexBuilder`].
#[async_trait]
pub trait StreamSender<T: Send + 'static>: Send + Sync {
    async fn send(&self, payload: T) -> Result<Flow, BoxError>;
}

/// Terminal call on the send side, used after repeatable sends.
#[async_trait]
pub trait StreamCloser: Send + Sync {
    async fn close(&self) -> Result<Flow, BoxError>;
}

/// Produces the next result from the receive side.
#[async_trait]
pub trait StreamReceiver<U: Send + 'static>: Send + Sync {
    async fn recv(&self) -> Result<Received<U>, BoxError>;
}

pub(crate) enum SendSide<T: Send + 'static> {
    Repeatable {
        sender: Arc<dyn StreamSender<T>>,
        closer: Option<Arc<dyn StreamCloser>>,
    },
    Final(Arc<dyn StreamSender<T>>),
}

/// A duplex handle whose capabilities were resolved once at build time.
pub struct Duplex<T: Send + 'static, U: Send + 'static> {
    pub(crate) send: Option<SendSide<T>>,
    pub(crate) recv: Option<Arc<dyn StreamReceiver<U>>>,
    capabilities: Capabilities,
}

impl<T: Send + 'static, U: Send + 'static> Duplex<T, U> {
    pub fn builder() -> DuplexBuilder<T, U> {
        DuplexBuilder::new()
    }

    /// A duplex with no send or receive side; pumping it is a no-op.
    pub fn empty() -> Self {
        DuplexBuilder::new().build()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl<T: Send + 'static, U: Send + 'static> fmt::Debug for Duplex<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Duplex")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Collects the operations a duplex offers.
///
/// Any subset of slots may be filled. When both `send` and `send_and_close`
/// are set, `send` takes priority. `close` is only used together with `send`.
pub struct DuplexBuilder<T: Send + 'static, U: Send + 'static> {
    send: Option<Arc<dyn StreamSender<T>>>,
    send_and_close: Option<Arc<dyn StreamSender<T>>>,
    close: Option<Arc<dyn StreamCloser>>,
    recv: Option<Arc<dyn StreamReceiver<U>>>,
}

impl<T: Send + 'static, U: Send + 'static> Default for DuplexBuilder<T, U> {
    fn default() -> Self {
        Self {
            send: None,
            send_and_close: None,
            close: None,
            recv: None,
        }
    }
}

impl<T: Send + 'static, U: Send + 'static> DuplexBuilder<T, U> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send<S>(mut self, sender: Arc<S>) -> Self
    where
        S: StreamSender<T> + 'static,
    {
        self.send = Some(sender as Arc<dyn StreamSender<T>>);
        self
    }

    pub fn send_and_close<S>(mut self, sender: Arc<S>) -> Self
    where
        S: StreamSender<T> + 'static,
    {
        self.send_and_close = Some(sender as Arc<dyn StreamSender<T>>);
        self
    }

    pub fn close<C>(mut self, closer: Arc<C>) -> Self
    where
        C: StreamCloser + 'static,
    {
        self.close = Some(closer as Arc<dyn StreamCloser>);
        self
    }

    pub fn recv<R>(mut self, receiver: Arc<R>) -> Self
    where
        R: StreamReceiver<U> + 'static,
    {
        self.recv = Some(receiver as Arc<dyn StreamReceiver<U>>);
        self
    }

    /// Probes the filled slots and fixes the capability set.
    pub fn build(self) -> Duplex<T, U> {
        let capabilities = probe(
            self.send.is_some(),
            self.send_and_close.is_some(),
            self.close.is_some(),
            self.recv.is_some(),
        );

        let send = match capabilities.send {
            SendMode::Repeatable { .. } => self.send.map(|sender| SendSide::Repeatable {
                sender,
                closer: self.close,
            }),
            SendMode::SendAndClose => self.send_and_close.map(SendSide::Final),
            SendMode::None => None,
        };

        Duplex {
            send,
            recv: self.recv,
            capabilities,
        }
    }
}
