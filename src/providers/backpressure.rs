//! Streaming backpressure and cancellation via bounded channels.
//!
//! Wraps a backend stream in a producer task that feeds a bounded
//! `tokio::sync::mpsc::channel`. The producer blocks when the consumer
//! falls behind and stops as soon as the consumer drops its end, which
//! drops the backend stream and with it the in-flight request.
//!
//! The wrapper also enforces the end-marker contract: the consumer sees
//! `Content*` followed by exactly one `Done`, or by exactly one `Err`.
//! A backend stream that closes without `Done`, or stalls longer than
//! the idle timeout, is reported as `BackendUnavailable`.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::types::{ChatEvent, ChatStream};
use crate::{MimirError, Result};

/// Default number of items buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Wrap a stream in a bounded channel.
///
/// # Panics
///
/// Requires a tokio runtime context (called within an async fn).
pub fn bounded_stream(inner: ChatStream, buffer_size: usize, idle_timeout: Duration) -> ChatStream {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<ChatEvent>>(buffer_size.max(1));

    tokio::spawn(async move {
        let mut inner = inner;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("stream consumer dropped, cancelling producer");
                    return;
                }
                next = tokio::time::timeout(idle_timeout, inner.next()) => next,
            };

            let item = match next {
                Ok(Some(item)) => item,
                Ok(None) => Err(MimirError::BackendUnavailable(
                    "stream closed without completion marker".into(),
                )),
                Err(_) => Err(MimirError::BackendUnavailable(format!(
                    "no stream data within {idle_timeout:?}"
                ))),
            };

            let terminal = !matches!(item, Ok(ChatEvent::Content(_)));
            if tx.send(item).await.is_err() || terminal {
                return;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
