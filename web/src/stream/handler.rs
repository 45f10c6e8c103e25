use crate::params::{self, StreamParams};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use log::*;
use service::AppState;
use sse::registry::PollerKey;
use sse::session;
use std::convert::Infallible;
use std::time::Duration;

/// SSE handler turning one upstream JSON resource into a long-lived event
/// stream. Clients asking for the same URL at the same poll interval share
/// the upstream poller; dropping the connection releases the share.
pub(crate) async fn stream(
    State(app_state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let params = StreamParams::resolve(&uri, &headers, &app_state.config);
    info!(
        "A client is subscribing to SSE stream for \"{}\" in mode \"{}\".",
        params.upstream, params.mode
    );

    let forwarded = params::forward_headers(&headers, &app_state.config.pass_headers);
    let key = PollerKey::new(
        params.upstream,
        Duration::from_secs(params.refresh_interval),
    );
    let subscription = app_state.stream_registry.acquire(key, forwarded);

    let frames = session::stream_frames(
        subscription,
        params.mode,
        Duration::from_secs(params.ping_interval),
    );

    Sse::new(frames.map(|frame| Ok(frame.into_event())))
}
