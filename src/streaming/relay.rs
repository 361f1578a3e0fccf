//! Streaming relay
//!
//! Drives one upstream response through a translator and forwards the
//! resulting canonical events to the caller over a bounded channel. The relay
//! runs in its own task; the downstream body only reads the channel. The
//! upstream is opened with [`Relay::open`] before any response headers go out,
//! so a refused connection or a non-2xx status is still an HTTP error.
//!
//! State moves `Idle -> HeadersSent -> Streaming -> Terminated`. Once a
//! terminal event is sent, or the caller goes away, nothing more is written.

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::canonical::{ErrorDetail, StreamEvent};
use crate::proxy::{ByteStream, RequestContext, UpstreamClient, UpstreamError, UpstreamRequest};
use crate::routes::metrics;
use crate::translate::{DecodeContext, ProviderTranslator, Translator};

/// Events buffered between the relay task and the downstream body
pub const RELAY_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    /// Response headers are committed; errors can only travel as events now
    HeadersSent,
    Streaming,
    Terminated,
}

/// How a relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `message_stop` was delivered
    Completed,
    /// An `error` event was delivered
    Failed,
    /// The caller dropped the stream; upstream was cancelled
    Disconnected,
}

impl RelayOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::Failed => "failed",
            RelayOutcome::Disconnected => "disconnected",
        }
    }
}

/// The receiving side is gone, or the stream already terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Sending half of the relay channel, tracking relay state
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    state: RelayState,
    sent: usize,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx,
            state: RelayState::Idle,
            sent: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Number of events delivered so far
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn headers_sent(&mut self) {
        if self.state == RelayState::Idle {
            self.state = RelayState::HeadersSent;
        }
    }

    fn begin_streaming(&mut self) {
        if self.state == RelayState::HeadersSent {
            self.state = RelayState::Streaming;
        }
    }

    /// Resolves when the receiver has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Deliver one event, waiting for channel capacity
    pub async fn send(&mut self, event: StreamEvent) -> Result<(), SinkClosed> {
        if self.state == RelayState::Terminated {
            return Err(SinkClosed);
        }

        let terminal = event.is_terminal();
        if self.tx.send(event).await.is_err() {
            self.state = RelayState::Terminated;
            return Err(SinkClosed);
        }

        self.sent += 1;
        if terminal {
            self.state = RelayState::Terminated;
        }
        Ok(())
    }
}

/// Send a batch of events, stopping at the first terminal one
async fn forward(events: Vec<StreamEvent>, sink: &mut EventSink) -> Option<RelayOutcome> {
    for event in events {
        let outcome = match &event {
            StreamEvent::MessageStop => Some(RelayOutcome::Completed),
            StreamEvent::Error { .. } => Some(RelayOutcome::Failed),
            _ => None,
        };
        if sink.send(event).await.is_err() {
            return Some(RelayOutcome::Disconnected);
        }
        if outcome.is_some() {
            return outcome;
        }
    }
    None
}

/// Terminate the stream with one error event
async fn fail(ctx: &mut DecodeContext, sink: &mut EventSink, detail: ErrorDetail) -> RelayOutcome {
    let event = ctx.fail(detail);
    match sink.send(event).await {
        Ok(()) => RelayOutcome::Failed,
        Err(SinkClosed) => RelayOutcome::Disconnected,
    }
}

/// Pump an upstream body through `translator` into `sink` until the stream
/// terminates, fails, or the receiver goes away.
///
/// Every upstream read races the receiver's `closed()` signal and the idle
/// timeout. `source` is owned and dropped on return, which cancels the
/// upstream request when it is a live response body.
pub async fn pump<S, T>(
    mut source: S,
    translator: &T,
    ctx: &mut DecodeContext,
    sink: &mut EventSink,
    idle_timeout: Duration,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Unpin,
    T: Translator,
{
    sink.begin_streaming();

    loop {
        let next = tokio::select! {
            biased;
            _ = sink.closed() => return RelayOutcome::Disconnected,
            next = tokio::time::timeout(idle_timeout, source.next()) => next,
        };

        let decoded = match next {
            Err(_) => {
                let detail = UpstreamError::IdleTimeout(idle_timeout).to_error_detail();
                return fail(ctx, sink, detail).await;
            }
            Ok(Some(Err(error))) => return fail(ctx, sink, error.to_error_detail()).await,
            Ok(Some(Ok(chunk))) if chunk.is_empty() => continue,
            Ok(Some(Ok(chunk))) => translator.decode_chunk(&chunk, ctx),
            Ok(None) => {
                // Clean close: flush partial input, then finish the message
                let closing = translator.decode_chunk(&[], ctx).and_then(|mut events| {
                    events.extend(ctx.finish()?);
                    Ok(events)
                });
                return match closing {
                    Ok(events) => forward(events, sink)
                        .await
                        .unwrap_or(RelayOutcome::Completed),
                    Err(error) => fail(ctx, sink, error.to_error_detail()).await,
                };
            }
        };

        match decoded {
            Ok(events) => {
                if let Some(outcome) = forward(events, sink).await {
                    return outcome;
                }
            }
            Err(error) => return fail(ctx, sink, error.to_error_detail()).await,
        }
    }
}

/// Spawns one relay task per request
#[derive(Debug, Clone)]
pub struct Relay {
    upstream: UpstreamClient,
    idle_timeout: Duration,
}

impl Relay {
    pub fn new(upstream: UpstreamClient, idle_timeout: Duration) -> Self {
        Self {
            upstream,
            idle_timeout,
        }
    }

    /// Send `request` and wait for the response head, bounded by the idle
    /// timeout
    pub async fn open(&self, request: &UpstreamRequest) -> Result<ByteStream, UpstreamError> {
        match tokio::time::timeout(self.idle_timeout, self.upstream.open(request)).await {
            Ok(opened) => opened,
            Err(_) => Err(UpstreamError::IdleTimeout(self.idle_timeout)),
        }
    }

    /// Relay a response body that [`Relay::open`] already produced
    pub fn attach(
        &self,
        translator: ProviderTranslator,
        stream: ByteStream,
        context: RequestContext,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        let idle_timeout = self.idle_timeout;
        let span = context.create_span();

        tokio::spawn(
            async move {
                let started = Instant::now();
                let mut sink = EventSink::new(tx);
                sink.headers_sent();
                let mut decode = DecodeContext::new(context.model.clone());

                context.log_stream_started();
                let outcome = pump(stream, &translator, &mut decode, &mut sink, idle_timeout).await;
                record_outcome(&context, &sink, outcome, started);
            }
            .instrument(span),
        );

        rx
    }
}

fn record_outcome(context: &RequestContext, sink: &EventSink, outcome: RelayOutcome, started: Instant) {
    let provider = context.provider.as_str();
    metrics::record_request(provider, outcome.as_str());
    metrics::record_stream_duration(provider, started.elapsed().as_secs_f64());

    match outcome {
        RelayOutcome::Disconnected => {
            metrics::record_disconnect(provider);
            context.log_disconnect(sink.sent());
        }
        _ => context.log_stream_ended(sink.sent(), outcome.as_str()),
    }
}
