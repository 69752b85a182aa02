mod source_buffers;

pub use source_buffers::{SourceBufferQueue, SourceBufferQueueElement};
