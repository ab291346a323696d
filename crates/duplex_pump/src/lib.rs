#![forbid(unsafe_code)]
//! Bridges a stream of concatenated JSON values with a send/recv duplex.
//!
//! The pump decodes each JSON record from an input stream, forwards it through
//! the duplex's send side, concurrently drains the duplex's receive side, and
//! writes every received record back out as pretty-printed JSON.
//!
//! - Duplex handles are described with [`DuplexBuilder`]: fill any of the
//!   `send`, `send_and_close`, `close`, and `recv` slots. The slots are probed
//!   once at build time into [`Capabilities`].
//! - End of stream is the [`Flow::End`] / [`Received::End`] variant, never an
//!   error value.
//! - [`pump`] returns the first loop failure; [`run`] reports it to the
//!   diagnostics stream and never fails.
//!
//! ```rust,no_run
//! use duplex_pump::{loopback, run, PumpConfig, PumpIo};
//! # #[tokio::main]
//! # async fn main() {
//! let duplex = loopback::echo::<serde_json::Value>(16);
//! let report = run(duplex, PumpIo::stdio(), PumpConfig::default().verbose(true)).await;
//! assert!(report.is_success());
//! # }
//! ```

mod codec;
mod config;
mod duplex;
mod error;
mod probe;
mod progress;
mod pump;
mod session;

#[cfg(feature = "cli")]
pub mod cli;

pub mod loopback;

pub use codec::{RecordDecoder, RecordEncoder};
pub use config::{BoxReader, BoxWriter, PumpConfig, PumpIo, DEFAULT_MAX_RECORD_BYTES};
pub use duplex::{
    BoxError, Duplex, DuplexBuilder, Flow, Received, StreamCloser, StreamReceiver, StreamSender,
};
pub use error::{CodecError, PumpError};
pub use probe::{Capabilities, SendMode};
pub use progress::{Marker, Progress};
pub use pump::{pump, SessionStats};
pub use session::{run, SessionReport};
