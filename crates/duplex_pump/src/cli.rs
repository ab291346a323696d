//! Flag surface for choosing the pump's streams.

use std::path::Path;

use clap::Args;
use tracing::debug;

use crate::config::{BoxReader, BoxWriter, PumpConfig, PumpIo, DEFAULT_MAX_RECORD_BYTES};

/// Stream selection flags, meant to be flattened into a binary's own parser.
#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    /// Stream JSON payloads from file (`-` for stdin, empty for no input)
    #[arg(long = "stream-in", value_name = "PATH", default_value = "-")]
    pub stream_in: String,

    /// Stream JSON results to file (`-` for stdout, empty to discard)
    #[arg(long = "stream-out", value_name = "PATH", default_value = "-")]
    pub stream_out: String,

    /// Reject unknown fields in input payloads
    #[arg(long = "stream-in-strict")]
    pub strict: bool,

    /// Print send/recv markers to stderr
    #[arg(long = "stream-verbose")]
    pub verbose: bool,

    /// Largest input record accepted, in bytes
    #[arg(
        long = "stream-max-record-bytes",
        value_name = "BYTES",
        default_value_t = DEFAULT_MAX_RECORD_BYTES
    )]
    pub max_record_bytes: usize,
}

impl Default for StreamArgs {
    fn default() -> Self {
        Self {
            stream_in: "-".to_string(),
            stream_out: "-".to_string(),
            strict: false,
            verbose: false,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl StreamArgs {
    /// Codec and progress toggles; `verbose` is OR-ed with `--stream-verbose`.
    pub fn config(&self, verbose: bool) -> PumpConfig {
        PumpConfig::new()
            .strict(self.strict)
            .verbose(verbose || self.verbose)
            .max_record_bytes(self.max_record_bytes)
    }

    /// Opens the selected streams with stderr as the diagnostics stream.
    ///
    /// A file that cannot be opened is reported on stderr and replaced by an
    /// empty input or a discarding output.
    pub async fn open(&self) -> PumpIo {
        let mut diagnostics = Vec::new();
        let input = open_input(&self.stream_in, &mut diagnostics).await;
        let output = open_output(&self.stream_out, &mut diagnostics).await;
        for line in diagnostics {
            eprintln!("{line}");
        }
        PumpIo {
            input,
            output,
            diagnostics: Box::new(tokio::io::stderr()),
        }
    }
}

pub(crate) async fn open_input(path: &str, diagnostics: &mut Vec<String>) -> BoxReader {
    match path {
        "-" => Box::new(tokio::io::stdin()),
        "" => Box::new(tokio::io::empty()),
        path => match tokio::fs::File::open(Path::new(path)).await {
            Ok(file) => Box::new(file),
            Err(err) => {
                debug!(path, error = %err, "failed to open pump input");
                diagnostics.push(format!("open {path}: {err}"));
                Box::new(tokio::io::empty())
            }
        },
    }
}

pub(crate) async fn open_output(path: &str, diagnostics: &mut Vec<String>) -> BoxWriter {
    match path {
        "-" => Box::new(tokio::io::stdout()),
        "" => Box::new(tokio::io::sink()),
        path => match tokio::fs::File::create(Path::new(path)).await {
            Ok(file) => Box::new(file),
            Err(err) => {
                debug!(path, error = %err, "failed to create pump output");
                diagnostics.push(format!("create {path}: {err}"));
                Box::new(tokio::io::sink())
            }
        },
    }
}
