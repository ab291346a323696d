use tracing::debug;

/// Which send operation the pump drives.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendMode {
    /// No send side; the send loop is not started.
    None,
    /// Repeated `send` calls, followed by `close` when one is available.
    Repeatable { close: bool },
    /// Each payload goes through `send_and_close`; no separate close call.
    SendAndClose,
}

/// Capability set of a duplex, fixed for the lifetime of a pump session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Capabilities {
    pub send: SendMode,
    pub recv: bool,
}

impl Capabilities {
    pub fn has_send(&self) -> bool {
        self.send != SendMode::None
    }

    /// `true` when neither loop would run.
    pub fn is_empty(&self) -> bool {
        !self.has_send() && !self.recv
    }
}

pub(crate) fn probe(send: bool, send_and_close: bool, close: bool, recv: bool) -> Capabilities {
    let send = if send {
        SendMode::Repeatable { close }
    } else if send_and_close {
        SendMode::SendAndClose
    } else {
        SendMode::None
    };

    let capabilities = Capabilities { send, recv };
    debug!(
        ?capabilities,
        ignored_send_and_close = send_and_close && matches!(send, SendMode::Repeatable { .. }),
        "probed duplex capabilities"
    );
    capabilities
}
