use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tracing::debug;

use crate::{
    codec::{RecordDecoder, RecordEncoder},
    config::PumpConfig,
    duplex::{Duplex, Flow, Received, SendSide, StreamReceiver},
    error::PumpError,
    progress::{Marker, Progress},
};

/// Counters for a session that finished without error.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SessionStats {
    /// Send calls made, including one that reported end of stream.
    pub sent: usize,
    /// Results received and written to the output.
    pub received: usize,
}

type LoopHandle = JoinHandle<Result<usize, PumpError>>;

/// Runs the send and receive loops of `duplex` concurrently and waits for both.
///
/// Only the loops whose capability exists are started. The input is dropped
/// right away when there is no send side, the output when there is no
/// receive side. When both loops fail the send side's error is returned.
pub async fn pump<T, U, R, W>(
    duplex: Duplex<T, U>,
    input: R,
    output: W,
    progress: &Progress,
    config: PumpConfig,
) -> Result<SessionStats, PumpError>
where
    T: DeserializeOwned + Send + 'static,
    U: Serialize + Send + 'static,
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    debug!(
        capabilities = ?duplex.capabilities(),
        strict = config.strict,
        max_record_bytes = config.max_record_bytes,
        "starting pump session"
    );
    let Duplex { send, recv, .. } = duplex;

    let send_task: Option<LoopHandle> = send.map(|side| {
        tokio::spawn(send_loop(
            side,
            RecordDecoder::new(input, config.strict).max_record_bytes(config.max_record_bytes),
            progress.clone(),
        ))
    });
    let recv_task: Option<LoopHandle> = recv.map(|receiver| {
        tokio::spawn(recv_loop(
            receiver,
            RecordEncoder::new(output),
            progress.clone(),
        ))
    });

    let sent = join_loop(send_task).await;
    let received = join_loop(recv_task).await;
    progress.mark(Marker::SessionEnd);

    let stats = SessionStats {
        sent: sent?,
        received: received?,
    };
    debug!(sent = stats.sent, received = stats.received, "pump session finished");
    Ok(stats)
}

async fn join_loop(task: Option<LoopHandle>) -> Result<usize, PumpError> {
    match task {
        Some(handle) => handle.await?,
        None => Ok(0),
    }
}

async fn send_loop<T, R>(
    side: SendSide<T>,
    mut decoder: RecordDecoder<R>,
    progress: Progress,
) -> Result<usize, PumpError>
where
    T: DeserializeOwned + Send + 'static,
    R: AsyncRead + Unpin,
{
    let sender = match &side {
        SendSide::Repeatable { sender, .. } => sender,
        SendSide::Final(sender) => sender,
    };

    let mut sent = 0;
    loop {
        let payload = match decoder.next_record::<T>().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                progress.mark(Marker::InputEnd);
                break;
            }
            Err(err) => {
                progress.mark(Marker::DecodeFailed);
                return Err(PumpError::Decode(err));
            }
        };

        progress.mark(Marker::Sent);
        let flow = sender.send(payload).await;
        sent += 1;
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::End) => {
                progress.mark(Marker::Closed);
                break;
            }
            Err(err) => {
                progress.mark(Marker::SendFailed);
                return Err(PumpError::Send(err));
            }
        }
    }
    drop(decoder);

    if let SendSide::Repeatable {
        closer: Some(closer),
        ..
    } = &side
    {
        let flow = closer.close().await.map_err(PumpError::Close)?;
        debug!(?flow, sent, "send side closed");
    }
    Ok(sent)
}

async fn recv_loop<U, W>(
    receiver: Arc<dyn StreamReceiver<U>>,
    mut encoder: RecordEncoder<W>,
    progress: Progress,
) -> Result<usize, PumpError>
where
    U: Serialize + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut received = 0;
    loop {
        match receiver.recv().await.map_err(PumpError::Recv)? {
            Received::Item(result) => {
                progress.mark(Marker::Received);
                encoder
                    .write_record(result)
                    .await
                    .map_err(PumpError::Encode)?;
                received += 1;
            }
            Received::End => {
                progress.mark(Marker::Closed);
                break;
            }
        }
    }

    encoder.finish().await.map_err(PumpError::Encode)?;
    Ok(received)
}
