//! SSE broadcaster (C8, spec §4.8): turns a job's subscription queue into
//! an `axum` event stream, with a 30s heartbeat so idle connections don't
//! get killed by intermediate proxies, a terminal-frame-then-close
//! contract, and a single `error` frame for an unknown job id — all
//! matching the original service's `sse_manager`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, BoxStream, Stream, StreamExt};

use crate::job::{JobId, JobRegistry, Subscription};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Build the SSE response for `GET /api/jobs/{id}/events`. Always opens a
/// stream: an unknown job id emits a single `error` frame and closes
/// (spec §4.8), the same as a job that's already terminal emits its one
/// snapshot frame via `JobRegistry::subscribe` and closes.
pub async fn job_event_stream(
    registry: &JobRegistry,
    id: JobId,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let stream: BoxStream<'static, Result<Event, Infallible>> = match registry.subscribe(id).await {
        Some(subscription) => stream_from_subscription(subscription).boxed(),
        None => stream::once(async move {
            Ok(Event::default()
                .event("error")
                .json_data(serde_json::json!({
                    "id": id,
                    "status": "error",
                    "progress": null,
                    "message": "job not found",
                    "data": null,
                }))
                .unwrap_or_else(|_| Event::default().event("error").data("{}")))
        })
        .boxed(),
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL))
}

fn frame_to_event(frame: &crate::job::subscription::Frame) -> Event {
    let payload = serde_json::json!({
        "status": frame.status,
        "progress": frame.progress,
        "message": frame.message,
        "data": frame.data,
    });
    Event::default()
        .event(frame.status.to_string())
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event("error").data("failed to encode frame"))
}

/// Turn a subscription into a `Stream` of SSE events: each frame becomes an
/// event named after its job status, a receive timeout becomes a heartbeat
/// comment frame, and the close sentinel ends the stream.
pub fn stream_from_subscription(
    subscription: Arc<Subscription>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |subscription| async move {
        match tokio::time::timeout(HEARTBEAT_INTERVAL, subscription.recv()).await {
            Ok(Some(frame)) => {
                let event = frame_to_event(&frame);
                Some((Ok(event), subscription))
            }
            Ok(None) => None,
            Err(_elapsed) => {
                let heartbeat = Event::default().event("heartbeat").data("{}");
                Some((Ok(heartbeat), subscription))
            }
        }
    })
}
