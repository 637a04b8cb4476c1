//! Broadcast-backed event streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

pin_project! {
    /// Subscription to one kind of worker event.
    ///
    /// Yields events in emission order and ends once the worker is terminated.
    /// A subscriber that falls more than the channel capacity behind skips the
    /// overwritten events and logs how many were lost.
    pub struct EventStream<T> {
        #[pin]
        inner: BroadcastStream<T>,
        kind: &'static str,
        missed: u64,
    }
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<T>, kind: &'static str) -> Self {
        Self { inner: BroadcastStream::new(receiver), kind, missed: 0 }
    }

    /// A stream that is already finished, handed out after termination.
    pub(crate) fn closed(kind: &'static str) -> Self {
        let (_, receiver) = broadcast::channel(1);
        Self::new(receiver, kind)
    }

    /// Events skipped because this subscriber lagged.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}

impl<T: Clone + Send + 'static> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(event)) => return Poll::Ready(Some(event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    *this.missed += skipped;
                    warn!("{} subscriber lagged, skipped {} events", this.kind, skipped);
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_in_order_and_ends_with_sender() {
        let (tx, rx) = broadcast::channel(8);
        let mut stream = EventStream::new(rx, "test");
        for i in 0..3u32 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let events: Vec<u32> = stream.by_ref().collect().await;
        assert_eq!(events, vec![0, 1, 2]);
        assert_eq!(stream.missed(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_overwritten_events() {
        let _ = tracing_subscriber::fmt::try_init();
        let (tx, rx) = broadcast::channel(2);
        let mut stream = EventStream::new(rx, "frame");
        for i in 0..5u32 {
            tx.send(i).unwrap();
        }
        drop(tx);

        let events: Vec<u32> = stream.by_ref().collect().await;
        assert_eq!(events, vec![3, 4]);
        assert_eq!(stream.missed(), 3);
    }

    #[tokio::test]
    async fn closed_stream_is_empty() {
        let mut stream = EventStream::<u32>::closed("metadata");
        assert!(stream.next().await.is_none());
    }
}
