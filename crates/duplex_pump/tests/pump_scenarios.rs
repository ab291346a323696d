use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use duplex_pump::{
    pump, BoxError, CodecError, Duplex, DuplexBuilder, Flow, Progress, PumpConfig, PumpError,
    Received, SessionStats, StreamCloser, StreamReceiver, StreamSender,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    #[serde(rename = "A")]
    a: i64,
    #[serde(rename = "B", default, skip_serializing_if = "String::is_empty")]
    b: String,
}

fn payload(a: i64) -> Payload {
    Payload {
        a,
        b: String::new(),
    }
}

/// Records every call; can answer a chosen send with end-of-stream or a failure.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<Payload>>,
    closes: AtomicUsize,
    end_at: Option<usize>,
    fail_at: Option<usize>,
    close_outcome: Option<Flow>,
    close_fails: bool,
}

impl RecordingSender {
    fn sent(&self) -> Vec<Payload> {
        self.sent.lock().unwrap().clone()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSender<Payload> for RecordingSender {
    async fn send(&self, payload: Payload) -> Result<Flow, BoxError> {
        let index = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(payload);
            sent.len() - 1
        };
        if self.fail_at == Some(index) {
            return Err("boom".into());
        }
        if self.end_at == Some(index) {
            return Ok(Flow::End);
        }
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl StreamCloser for RecordingSender {
    async fn close(&self) -> Result<Flow, BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            return Err("close refused".into());
        }
        Ok(self.close_outcome.unwrap_or(Flow::Continue))
    }
}

/// Replays a fixed script, then reports end-of-stream.
struct ScriptedReceiver<U> {
    script: Mutex<VecDeque<Result<Received<U>, BoxError>>>,
    calls: AtomicUsize,
}

impl<U> ScriptedReceiver<U> {
    fn new(script: Vec<Result<Received<U>, BoxError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn items(items: Vec<U>) -> Self {
        Self::new(items.into_iter().map(|u| Ok(Received::Item(u))).collect())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<U: Send + 'static> StreamReceiver<U> for ScriptedReceiver<U> {
    async fn recv(&self) -> Result<Received<U>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Received::End))
    }
}

struct PumpRun {
    result: Result<SessionStats, PumpError>,
    output: String,
    markers: String,
}

async fn pump_text<T, U>(duplex: Duplex<T, U>, input: &'static str, strict: bool) -> PumpRun
where
    T: serde::de::DeserializeOwned + Send + 'static,
    U: Serialize + Send + 'static,
{
    let (out_writer, mut out_reader) = tokio::io::duplex(64 * 1024);
    let (diag_writer, mut diag_reader) = tokio::io::duplex(64 * 1024);
    let (progress, diag_task) = Progress::spawn(diag_writer, true);

    let result = pump(
        duplex,
        input.as_bytes(),
        out_writer,
        &progress,
        PumpConfig::new().strict(strict),
    )
    .await;
    drop(progress);
    diag_task.await.unwrap().unwrap();

    let mut output = String::new();
    out_reader.read_to_string(&mut output).await.unwrap();
    let mut markers = String::new();
    diag_reader.read_to_string(&mut markers).await.unwrap();

    PumpRun {
        result,
        output,
        markers,
    }
}

const THREE: &str = r#"{"A":1}{"A":2}{"A":3}"#;

#[tokio::test]
async fn send_and_close_only_sends_every_record_then_closes_once() {
    let sender = Arc::new(RecordingSender::default());
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, THREE, false).await;

    assert_eq!(
        run.result.unwrap(),
        SessionStats {
            sent: 3,
            received: 0
        }
    );
    assert_eq!(sender.sent(), vec![payload(1), payload(2), payload(3)]);
    assert_eq!(sender.closes(), 1);
    assert_eq!(run.output, "");
    assert_eq!(run.markers, "^^^$\n");
}

#[tokio::test]
async fn end_from_send_stops_the_loop_and_still_closes() {
    let sender = Arc::new(RecordingSender {
        end_at: Some(1),
        ..Default::default()
    });
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, THREE, false).await;

    assert!(run.result.is_ok(), "{:?}", run.result);
    assert_eq!(sender.sent(), vec![payload(1), payload(2)]);
    assert_eq!(sender.closes(), 1);
    assert_eq!(run.markers, "^^#\n");
}

#[tokio::test]
async fn send_and_close_form_never_calls_close() {
    let sender = Arc::new(RecordingSender::default());
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send_and_close(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, THREE, false).await;

    assert!(run.result.is_ok());
    assert_eq!(sender.sent().len(), 3);
    assert_eq!(sender.closes(), 0);
    assert_eq!(run.markers, "^^^$\n");
}

#[tokio::test]
async fn send_and_close_end_stops_without_close() {
    let sender = Arc::new(RecordingSender {
        end_at: Some(0),
        ..Default::default()
    });
    let duplex: Duplex<Payload, Payload> =
        DuplexBuilder::new().send_and_close(sender.clone()).build();

    let run = pump_text(duplex, THREE, false).await;

    assert!(run.result.is_ok());
    assert_eq!(sender.sent(), vec![payload(1)]);
    assert_eq!(sender.closes(), 0);
    assert_eq!(run.markers, "^#\n");
}

#[tokio::test]
async fn recv_only_writes_pretty_records_in_order() {
    let receiver = Arc::new(ScriptedReceiver::items(vec![
        payload(1),
        payload(2),
        payload(3),
    ]));
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new().recv(receiver.clone()).build();

    let run = pump_text(duplex, "", false).await;

    assert_eq!(
        run.result.unwrap(),
        SessionStats {
            sent: 0,
            received: 3
        }
    );
    assert_eq!(
        run.output,
        "{\n  \"A\": 1\n}\n{\n  \"A\": 2\n}\n{\n  \"A\": 3\n}\n"
    );
    assert_eq!(run.markers, "vvv#\n");
    assert_eq!(receiver.calls(), 4);
}

#[tokio::test]
async fn empty_duplex_is_an_immediate_success() {
    let run = pump_text(Duplex::<Payload, Payload>::empty(), THREE, false).await;

    assert_eq!(run.result.unwrap(), SessionStats::default());
    assert_eq!(run.output, "");
    assert_eq!(run.markers, "\n");
}

#[tokio::test]
async fn decode_failure_stops_before_the_bad_record() {
    let sender = Arc::new(RecordingSender::default());
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, r#"{"A":1} {"A":2} {"A":} {"A":4}"#, false).await;

    let err = run.result.unwrap_err();
    assert!(matches!(err, PumpError::Decode(CodecError::Json(_))), "{err:?}");
    assert!(err.to_string().starts_with("input: "), "{err}");
    assert_eq!(sender.sent(), vec![payload(1), payload(2)]);
    assert_eq!(sender.closes(), 0);
    assert_eq!(run.markers, "^^?\n");
}

#[tokio::test]
async fn strict_mode_reports_unknown_fields_as_decode_errors() {
    let sender = Arc::new(RecordingSender::default());
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new().send(sender.clone()).build();

    let run = pump_text(duplex, r#"{"A":1,"Extra":true}"#, true).await;

    let err = run.result.unwrap_err();
    match &err {
        PumpError::Decode(CodecError::UnknownFields { fields }) => {
            assert_eq!(fields, &vec!["Extra".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(sender.sent().is_empty());
    assert_eq!(run.markers, "?\n");
}

#[tokio::test]
async fn lenient_mode_ignores_unknown_fields() {
    let sender = Arc::new(RecordingSender::default());
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new().send(sender.clone()).build();

    let run = pump_text(duplex, r#"{"A":1,"Extra":true}"#, false).await;

    assert!(run.result.is_ok());
    assert_eq!(sender.sent(), vec![payload(1)]);
    assert_eq!(run.markers, "^$\n");
}

#[tokio::test]
async fn send_failure_is_terminal_and_skips_close() {
    let sender = Arc::new(RecordingSender {
        fail_at: Some(1),
        ..Default::default()
    });
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, THREE, false).await;

    let err = run.result.unwrap_err();
    assert!(matches!(err, PumpError::Send(_)));
    assert_eq!(err.to_string(), "send: boom");
    assert_eq!(sender.sent().len(), 2);
    assert_eq!(sender.closes(), 0);
    assert_eq!(run.markers, "^^!\n");
}

#[tokio::test]
async fn close_failure_is_reported() {
    let sender = Arc::new(RecordingSender {
        close_fails: true,
        ..Default::default()
    });
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, r#"{"A":1}"#, false).await;

    let err = run.result.unwrap_err();
    assert!(matches!(err, PumpError::Close(_)));
    assert_eq!(err.to_string(), "close: close refused");
    assert_eq!(run.markers, "^$\n");
}

#[tokio::test]
async fn end_from_close_is_success() {
    let sender = Arc::new(RecordingSender {
        close_outcome: Some(Flow::End),
        ..Default::default()
    });
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .build();

    let run = pump_text(duplex, r#"{"A":1}"#, false).await;

    assert!(run.result.is_ok(), "{:?}", run.result);
    assert_eq!(sender.closes(), 1);
    assert_eq!(run.markers, "^$\n");
}

#[tokio::test]
async fn recv_failure_keeps_earlier_output() {
    let receiver = Arc::new(ScriptedReceiver::new(vec![
        Ok(Received::Item(payload(1))),
        Err("stream reset".into()),
        Ok(Received::Item(payload(2))),
    ]));
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new().recv(receiver.clone()).build();

    let run = pump_text(duplex, "", false).await;

    let err = run.result.unwrap_err();
    assert!(matches!(err, PumpError::Recv(_)));
    assert_eq!(err.to_string(), "recv: stream reset");
    assert_eq!(run.output, "{\n  \"A\": 1\n}\n");
    assert_eq!(run.markers, "v\n");
    assert_eq!(receiver.calls(), 2);
}

#[tokio::test]
async fn unserializable_result_is_an_encode_error() {
    let mut bad = BTreeMap::new();
    bad.insert(vec![1u8], 1u8);
    let receiver = Arc::new(ScriptedReceiver::items(vec![bad]));
    let duplex: Duplex<Payload, BTreeMap<Vec<u8>, u8>> =
        DuplexBuilder::new().recv(receiver).build();

    let run = pump_text(duplex, "", false).await;

    let err = run.result.unwrap_err();
    assert!(matches!(err, PumpError::Encode(CodecError::Json(_))), "{err:?}");
    assert!(err.to_string().starts_with("output: "), "{err}");
    assert_eq!(run.output, "");
    assert_eq!(run.markers, "v\n");
}

#[tokio::test]
async fn both_loops_run_against_one_duplex() {
    let sender = Arc::new(RecordingSender::default());
    let receiver = Arc::new(ScriptedReceiver::items(vec![payload(10), payload(20)]));
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender.clone())
        .close(sender.clone())
        .recv(receiver.clone())
        .build();

    let run = pump_text(duplex, THREE, false).await;

    assert_eq!(
        run.result.unwrap(),
        SessionStats {
            sent: 3,
            received: 2
        }
    );
    assert_eq!(sender.closes(), 1);
    assert_eq!(run.output, "{\n  \"A\": 10\n}\n{\n  \"A\": 20\n}\n");

    let count = |c: char| run.markers.chars().filter(|m| *m == c).count();
    assert_eq!(count('^'), 3);
    assert_eq!(count('v'), 2);
    assert_eq!(count('$'), 1);
    assert_eq!(count('#'), 1);
    assert!(run.markers.ends_with('\n'));
    assert_eq!(count('\n'), 1);
}

#[tokio::test]
async fn send_side_error_wins_when_both_loops_fail() {
    let sender = Arc::new(RecordingSender {
        fail_at: Some(0),
        ..Default::default()
    });
    let receiver = Arc::new(ScriptedReceiver::<Payload>::new(vec![Err("recv broke".into())]));
    let duplex: Duplex<Payload, Payload> = DuplexBuilder::new()
        .send(sender)
        .recv(receiver)
        .build();

    let run = pump_text(duplex, THREE, false).await;

    let err = run.result.unwrap_err();
    assert!(err.is_send_side());
    assert_eq!(err.to_string(), "send: boom");
}
