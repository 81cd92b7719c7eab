//! Player event system for front-end notifications

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events delivered to the player front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEvent {
    /// A capture device was opened and its tracks are available
    MediaOpened,
    /// Opening the capture device failed
    MediaOpenFailed,
    /// The capture device was closed
    MediaClosed,
    /// The track list changed
    TracksChanged,
    /// Playback rate dropped to zero
    PlaybackSuspended,
    /// Playback rate became non-zero
    PlaybackResumed,
}

impl MediaEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            MediaEvent::MediaOpened => "media_opened",
            MediaEvent::MediaOpenFailed => "media_open_failed",
            MediaEvent::MediaClosed => "media_closed",
            MediaEvent::TracksChanged => "tracks_changed",
            MediaEvent::PlaybackSuspended => "playback_suspended",
            MediaEvent::PlaybackResumed => "playback_resumed",
        }
    }

    /// Check if this event opens or closes the media source
    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            MediaEvent::MediaOpened | MediaEvent::MediaOpenFailed | MediaEvent::MediaClosed
        )
    }

    /// Check if this is a track event
    pub fn is_track_event(&self) -> bool {
        matches!(self, MediaEvent::TracksChanged)
    }

    /// Check if this is a playback rate event
    pub fn is_playback_event(&self) -> bool {
        matches!(
            self,
            MediaEvent::PlaybackSuspended | MediaEvent::PlaybackResumed
        )
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, MediaEvent::MediaOpenFailed)
    }
}

impl std::fmt::Display for MediaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Sending half of an event channel
pub type EventSender = mpsc::UnboundedSender<MediaEvent>;

/// Create a connected sender and stream
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, EventStream::new(rx))
}

/// Stream of player events for async iteration
#[derive(Debug)]
pub struct EventStream {
    /// Receiver for events
    receiver: mpsc::UnboundedReceiver<MediaEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<MediaEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<MediaEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<MediaEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Collect every event already queued
    pub fn drain(&mut self) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Check if the event stream is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Stream for EventStream {
    type Item = MediaEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_classification() {
        assert!(MediaEvent::MediaOpened.is_lifecycle_event());
        assert!(!MediaEvent::MediaOpened.is_track_event());

        assert!(MediaEvent::TracksChanged.is_track_event());
        assert!(!MediaEvent::TracksChanged.is_lifecycle_event());

        assert!(MediaEvent::PlaybackSuspended.is_playback_event());
        assert!(MediaEvent::PlaybackResumed.is_playback_event());

        assert!(MediaEvent::MediaOpenFailed.is_error_event());
        assert!(!MediaEvent::MediaClosed.is_error_event());
        assert_eq!(MediaEvent::MediaClosed.to_string(), "media_closed");
    }

    #[tokio::test]
    async fn test_event_stream_basic() {
        let (tx, mut event_stream) = event_channel();

        tx.send(MediaEvent::MediaOpened).unwrap();

        let received_event = event_stream.next().await.unwrap();
        assert_eq!(received_event.event_type(), "media_opened");
        assert!(event_stream.try_next().unwrap().is_none());

        drop(tx);
        assert!(event_stream.try_next().is_err());
    }

    #[tokio::test]
    async fn test_event_stream_as_futures_stream() {
        use futures::StreamExt;

        let (tx, event_stream) = event_channel();
        tx.send(MediaEvent::MediaOpened).unwrap();
        tx.send(MediaEvent::TracksChanged).unwrap();
        drop(tx);

        let events: Vec<MediaEvent> = event_stream.collect().await;
        assert_eq!(events, vec![MediaEvent::MediaOpened, MediaEvent::TracksChanged]);
    }
}
