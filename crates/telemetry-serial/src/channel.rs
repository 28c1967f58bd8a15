//! Channel-backed subscriber.
//!
//! The device layer calls the subscriber on its notification thread. Most
//! applications would rather consume readings from an async task, so
//! [`ChannelSubscriber`] turns every notice into a [`SourceEvent`] and
//! forwards it over an unbounded Tokio channel. Sending never blocks the
//! notification thread.
//!
//! ```text
//! notification thread           async task
//! ┌──────────────────┐         ┌─────────────────┐
//! │ SerialDataSource │──────►  │  SourceEvents   │──────► application
//! │ ChannelSubscriber│  mpsc   │  recv().await   │
//! └──────────────────┘         └─────────────────┘
//! ```
//!
//! # Examples
//!
//! ```
//! use telemetry_serial::{ChannelSubscriber, SourceEvent, Subscriber};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (subscriber, mut events) = ChannelSubscriber::<String>::new();
//!
//!     subscriber.receive_data("speed=42".to_string());
//!     subscriber.receive_error("Cannot read from input stream.");
//!
//!     assert_eq!(events.recv().await, Some(SourceEvent::Data("speed=42".to_string())));
//!     assert!(events.recv().await.unwrap().is_error());
//! }
//! ```

use tokio::sync::mpsc;
use tracing::warn;

use crate::traits::Subscriber;

/// One notice delivered by a data source.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SourceEvent<R> {
    /// A decoded reading.
    Data(R),

    /// An error notice, such as a failed read.
    Error(String),
}

impl<R> SourceEvent<R> {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The reading, if this is a data event.
    pub fn into_data(self) -> Option<R> {
        match self {
            Self::Data(reading) => Some(reading),
            Self::Error(_) => None,
        }
    }
}

/// Subscriber that forwards notices to a [`SourceEvents`] receiver.
#[derive(Debug)]
pub struct ChannelSubscriber<R> {
    event_tx: mpsc::UnboundedSender<SourceEvent<R>>,
}

impl<R> Clone for ChannelSubscriber<R> {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
        }
    }
}

impl<R> ChannelSubscriber<R>
where
    R: Send + 'static,
{
    /// Create a subscriber and the receiving end of its channel.
    pub fn new() -> (Self, SourceEvents<R>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, SourceEvents { event_rx })
    }

    fn forward(&self, event: SourceEvent<R>) {
        if self.event_tx.send(event).is_err() {
            warn!("Source event dropped: receiver closed");
        }
    }
}

impl<R> Subscriber<R> for ChannelSubscriber<R>
where
    R: Send + 'static,
{
    fn receive_data(&self, reading: R) {
        self.forward(SourceEvent::Data(reading));
    }

    fn receive_error(&self, message: &str) {
        self.forward(SourceEvent::Error(message.to_string()));
    }
}

/// Receiving end of a [`ChannelSubscriber`].
#[derive(Debug)]
pub struct SourceEvents<R> {
    event_rx: mpsc::UnboundedReceiver<SourceEvent<R>>,
}

impl<R> SourceEvents<R> {
    /// Receive the next event.
    ///
    /// Returns `None` once every subscriber clone has been dropped and the
    /// channel is drained.
    pub async fn recv(&mut self) -> Option<SourceEvent<R>> {
        self.event_rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SourceEvent<R>> {
        self.event_rx.try_recv().ok()
    }

    /// Stop accepting events; queued events can still be received.
    pub fn close(&mut self) {
        self.event_rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (subscriber, mut events) = ChannelSubscriber::new();

        subscriber.receive_data(1u32);
        subscriber.receive_error("bad read");
        subscriber.receive_data(2u32);

        assert_eq!(events.recv().await, Some(SourceEvent::Data(1)));
        assert_eq!(
            events.recv().await,
            Some(SourceEvent::Error("bad read".to_string()))
        );
        assert_eq!(events.recv().await, Some(SourceEvent::Data(2)));
    }

    #[tokio::test]
    async fn test_recv_ends_when_subscriber_dropped() {
        let (subscriber, mut events) = ChannelSubscriber::<u8>::new();
        subscriber.receive_data(7);
        drop(subscriber);

        assert_eq!(events.recv().await, Some(SourceEvent::Data(7)));
        assert_eq!(events.recv().await, None);
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (subscriber, mut events) = ChannelSubscriber::<u8>::new();
        events.close();

        subscriber.receive_data(1);
        assert_eq!(events.try_recv(), None);
    }

    #[test]
    fn test_delivery_from_another_thread() {
        let (subscriber, mut events) = ChannelSubscriber::<Vec<u8>>::new();

        std::thread::spawn(move || subscriber.receive_data(vec![1, 2, 3]))
            .join()
            .unwrap();

        assert_eq!(events.try_recv(), Some(SourceEvent::Data(vec![1, 2, 3])));
    }

    #[test]
    fn test_source_event_helpers() {
        assert!(SourceEvent::<u8>::Error("x".into()).is_error());
        assert_eq!(SourceEvent::Data(3u8).into_data(), Some(3));
        assert_eq!(SourceEvent::<u8>::Error("x".into()).into_data(), None);
    }
}
