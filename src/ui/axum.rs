//! Axum SSE responses for UI message streams.
//!
//! ```rust,ignore
//! use stepstream::ui::{axum::to_sse_response, UiStreamOptions};
//!
//! async fn chat(result: StreamTextResult) -> impl axum::response::IntoResponse {
//!     to_sse_response(result.to_ui_message_stream(UiStreamOptions::default()))
//! }
//! ```

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt, stream};

use super::{DONE_SENTINEL, UiMessageChunk};

/// Convert UI chunks into an Axum SSE response closed by `[DONE]`.
pub fn to_sse_response<S>(chunks: S) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send>
where
    S: Stream<Item = UiMessageChunk> + Send + 'static,
{
    let events = chunks
        .map(|chunk| {
            let data = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().data(data))
        })
        .chain(stream::once(async {
            Ok(Event::default().data(DONE_SENTINEL))
        }));
    Sse::new(events).keep_alive(KeepAlive::default())
}
