use std::collections::VecDeque;

use crate::environment::MediaBuffer;
use crate::playlist::InitSegmentId;
use crate::utils::time_ranges::TimeRanges;
use crate::Logger;

/// Serializes operations on a `MediaBuffer`, which can only perform one operation at a time.
///
/// Operations are performed in the order in which they were submitted. Asynchronous ones
/// (appends and removals) block the queue until `on_update_end` is called.
pub struct SourceBufferQueue<B: MediaBuffer> {
    /// The underlying buffer.
    buffer: B,

    /// Operations not yet started, from the most imminent to the least.
    queue: VecDeque<BufferOperation>,

    /// Asynchronous operation currently performed by the buffer, if any.
    in_flight: Option<SourceBufferQueueElement>,

    /// Last timestamp offset submitted, whether or not it has been applied yet.
    timestamp_offset: f64,

    /// If `true`, an end of stream has been scheduled and no data was pushed since.
    last_segment_pushed: bool,
}

/// Operation waiting to be performed on the `MediaBuffer`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BufferOperation {
    Append {
        data: Vec<u8>,
        element: SourceBufferQueueElement,
    },
    Remove {
        start: f64,
        end: f64,
    },
    SetTimestampOffset(f64),
    SetDuration(f64),
    EndOfStream,
}

/// Asynchronous operation performed by the `MediaBuffer`, reported back once it is finished.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceBufferQueueElement {
    /// An initialization segment is being pushed.
    PushInit(InitSegmentId),

    /// A media segment is being pushed, identified by the id of its loading operation.
    PushMedia(u64),

    /// Some already-buffered data is being removed, `start` and `end` giving the time range of
    /// the data to remove, in seconds.
    Remove { start: f64, end: f64 },
}

impl<B: MediaBuffer> SourceBufferQueue<B> {
    pub fn new(buffer: B) -> Self {
        Self {
            buffer,
            queue: VecDeque::new(),
            in_flight: None,
            timestamp_offset: 0.,
            last_segment_pushed: false,
        }
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    /// Time ranges currently buffered, as reported by the underlying buffer.
    pub fn buffered(&self) -> TimeRanges {
        self.buffer.buffered()
    }

    /// Returns `true` while an asynchronous operation is being performed.
    pub fn updating(&self) -> bool {
        self.in_flight.is_some() || self.buffer.updating()
    }

    /// Returns `true` if there is at least one operation not finished yet.
    pub fn has_operations_pending(&self) -> bool {
        self.updating() || !self.queue.is_empty()
    }

    /// Returns the last timestamp offset set through `set_timestamp_offset`, even if it has
    /// not been applied to the buffer yet.
    pub fn timestamp_offset(&self) -> f64 {
        self.timestamp_offset
    }

    /// Returns `true` if an end of stream was scheduled after the last append.
    pub fn is_last_segment_pushed(&self) -> bool {
        self.last_segment_pushed
    }

    /// Schedule a push of the given initialization segment.
    pub(crate) fn push_init_segment(&mut self, id: InitSegmentId, data: Vec<u8>) {
        Logger::debug("Buffer: Scheduling initialization segment push");
        self.last_segment_pushed = false;
        self.enqueue(BufferOperation::Append {
            data,
            element: SourceBufferQueueElement::PushInit(id),
        });
    }

    /// Schedule a push of a media segment, `id` identifying it once the push is over.
    pub(crate) fn push_media_segment(&mut self, id: u64, data: Vec<u8>) {
        Logger::lazy_debug(&|| format!("Buffer: Scheduling media segment push ({} bytes)", data.len()));
        self.last_segment_pushed = false;
        self.enqueue(BufferOperation::Append {
            data,
            element: SourceBufferQueueElement::PushMedia(id),
        });
    }

    /// Schedule the removal of media data between `start` and `end`, in seconds.
    pub(crate) fn remove_buffer(&mut self, start: f64, end: f64) {
        Logger::debug(&format!("Buffer: Scheduling removal {} {}", start, end));
        self.enqueue(BufferOperation::Remove { start, end });
    }

    pub(crate) fn set_timestamp_offset(&mut self, offset: f64) {
        Logger::debug(&format!("Buffer: Scheduling timestamp offset {}", offset));
        self.timestamp_offset = offset;
        self.enqueue(BufferOperation::SetTimestampOffset(offset));
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.enqueue(BufferOperation::SetDuration(duration));
    }

    pub(crate) fn end_of_stream(&mut self) {
        Logger::info("Buffer: Scheduling end of stream");
        self.last_segment_pushed = true;
        self.enqueue(BufferOperation::EndOfStream);
    }

    /// Drop every operation not started yet. The one in flight cannot be cancelled.
    pub(crate) fn clear_queue(&mut self) {
        Logger::info("Buffer: clearing queue.");
        self.queue.clear();
    }

    /// To call once an asynchronous operation has been finished by the underlying buffer.
    ///
    /// Returns the operation which just ended and starts the next ones.
    pub(crate) fn on_update_end(&mut self) -> Option<SourceBufferQueueElement> {
        let ended = self.in_flight.take();
        self.drain();
        ended
    }

    fn enqueue(&mut self, operation: BufferOperation) {
        self.queue.push_back(operation);
        self.drain();
    }

    fn drain(&mut self) {
        while !self.updating() {
            let Some(operation) = self.queue.pop_front() else {
                return;
            };
            match operation {
                BufferOperation::Append { data, element } => {
                    self.buffer.append_buffer(&data);
                    self.in_flight = Some(element);
                }
                BufferOperation::Remove { start, end } => {
                    self.buffer.remove(start, end);
                    self.in_flight = Some(SourceBufferQueueElement::Remove { start, end });
                }
                BufferOperation::SetTimestampOffset(offset) => {
                    self.buffer.set_timestamp_offset(offset)
                }
                BufferOperation::SetDuration(duration) => self.buffer.set_duration(duration),
                BufferOperation::EndOfStream => self.buffer.end_of_stream(),
            }
        }
    }
}
