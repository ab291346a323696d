use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::{
    config::{PumpConfig, PumpIo},
    duplex::Duplex,
    error::PumpError,
    progress::Progress,
    pump::{pump, SessionStats},
};

/// Outcome of [`run`]; a failed session is reported here, never returned as `Err`.
#[derive(Debug)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub error: Option<PumpError>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Pumps `duplex` against the given streams.
///
/// Any session error is written to the diagnostics stream as one line. The
/// streams are closed (dropped) before this returns.
pub async fn run<T, U>(duplex: Duplex<T, U>, io: PumpIo, config: PumpConfig) -> SessionReport
where
    T: DeserializeOwned + Send + 'static,
    U: Serialize + Send + 'static,
{
    let PumpIo {
        input,
        output,
        diagnostics,
    } = io;
    let (progress, writer) = Progress::spawn(diagnostics, config.verbose);

    let report = match pump(duplex, input, output, &progress, config).await {
        Ok(stats) => SessionReport { stats, error: None },
        Err(err) => {
            debug!(error = %err, send_side = err.is_send_side(), "pump session failed");
            progress.report(err.to_string());
            SessionReport {
                stats: SessionStats::default(),
                error: Some(err),
            }
        }
    };

    drop(progress);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "failed to write pump diagnostics"),
        Err(err) => warn!(error = %err, "pump diagnostics task failed"),
    }
    report
}
