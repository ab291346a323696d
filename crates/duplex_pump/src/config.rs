use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Largest single input record accepted by default (16 MiB).
pub const DEFAULT_MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Toggles read by the record codec and the progress reporter.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PumpConfig {
    /// Reject input records carrying fields the payload type does not know.
    pub strict: bool,
    /// Emit progress markers to the diagnostics stream.
    pub verbose: bool,
    /// Bytes one input record may occupy before decoding fails.
    pub max_record_bytes: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            strict: false,
            verbose: false,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl PumpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    pub fn strict(mut self, enable: bool) -> Self {
        self.strict = enable;
        self
    }

    pub fn verbose(mut self, enable: bool) -> Self {
        self.verbose = enable;
        self
    }
}

/// Streams owned by one pump invocation.
///
/// Every stream is dropped by the time the invocation returns.
pub struct PumpIo {
    pub input: BoxReader,
    pub output: BoxWriter,
    pub diagnostics: BoxWriter,
}

impl PumpIo {
    pub fn new<R, W, D>(input: R, output: W, diagnostics: D) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        D: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            diagnostics: Box::new(diagnostics),
        }
    }

    /// Process stdin, stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), tokio::io::stderr())
    }
}

impl std::fmt::Debug for PumpIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpIo").finish_non_exhaustive()
    }
}
