use std::sync::mpsc::{channel, Receiver, Sender};

use crate::segment_loader::{LoaderError, LoaderState};

/// Broadcasts events to any number of subscribers, each owning the receiving end of its own
/// channel.
///
/// Subscribers which dropped their `Receiver` are forgotten on the next emission.
pub struct Notifier<E: Clone> {
    subscribers: Vec<Sender<E>>,
}

impl<E: Clone> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Notifier<E> {
    pub fn new() -> Self {
        Self {
            subscribers: vec![],
        }
    }

    pub fn subscribe(&mut self) -> Receiver<E> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    pub fn emit(&mut self, event: E) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Events sent by the `SegmentLoader` to its subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum LoaderEvent {
    /// The loader went into a new state.
    StateChange(LoaderState),

    /// A segment has been fully appended to the buffer.
    Progress,

    /// New timing information was learned, either on the playlist or on one of its segments.
    SyncInfoUpdate,

    /// New bandwidth data is available, the rendition choice may be re-evaluated.
    BandwidthUpdate,

    /// The timestamp offset of the media buffer is being changed to this value, in seconds.
    TimestampOffset(f64),

    /// A segment has been probed on the given timeline, which is known to be offset by
    /// `mapping` seconds from the presentation timeline.
    SegmentTimeMapping { timeline: u64, mapping: f64 },

    Error(LoaderError),

    /// The whole buffer has been emptied and the loader restarts from scratch.
    ResetEverything,

    /// The last segment of an ended playlist has been appended.
    Ended,

    /// Segments should now be loaded from the rendition with that playlist URI, whose
    /// playlist has to be given through `set_playlist`.
    RenditionSwitch(String),
}
