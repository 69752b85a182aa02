use crate::playlist::{PlaylistRef, Segment};

/// Describes the segment currently being loaded by the `SegmentLoader`, from the decision to
/// load it until its data has been pushed to the buffer.
#[derive(Clone, Debug)]
pub struct SegmentInfo {
    /// Identifies that loading operation, also used for its decryption job and buffer push.
    pub(crate) request_id: u64,

    /// Index of the segment in `playlist`.
    ///
    /// It can become negative when a playlist refresh made that segment expire.
    pub(crate) media_index: isize,

    /// Media sequence number of the segment, stable across playlist refreshes.
    pub(crate) media_sequence: u64,

    /// Playlist the segment is part of.
    pub(crate) playlist: PlaylistRef,

    /// Copy of the segment's description at the time it was chosen.
    pub(crate) segment: Segment,

    /// Timeline the segment is part of.
    pub(crate) timeline: u64,

    /// Presentation time at which the segment is guessed to start, in seconds.
    pub(crate) start_of_segment: Option<f64>,

    /// Set when the buffer's timestamp offset must be changed to this value before pushing
    /// that segment.
    pub(crate) timestamp_offset: Option<f64>,

    /// If `true`, the segment is only loaded to learn timing information and will not be
    /// pushed.
    pub(crate) is_sync_request: bool,

    /// Data ready to be probed and pushed, `None` while still being loaded or decrypted.
    pub(crate) bytes: Option<Vec<u8>>,

    /// Size, in bytes, of the loaded segment.
    pub(crate) byte_length: usize,

    pub(crate) timings: SegmentTimings,
}

/// Monotonic timestamps, in milliseconds, of the loading steps of a segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentTimings {
    pub request_start: Option<f64>,
    pub end_of_all_requests: Option<f64>,
    pub decrypt_start: Option<f64>,
    pub decrypt_end: Option<f64>,
}

impl SegmentInfo {
    /// Describe the loading of the segment at `media_index` in `playlist`.
    ///
    /// Returns `None` if there is no segment at that index.
    pub(crate) fn new(
        playlist: &PlaylistRef,
        media_index: usize,
        start_of_segment: Option<f64>,
        is_sync_request: bool,
    ) -> Option<Self> {
        let pl = playlist.borrow();
        let segment = pl.segments.get(media_index)?.clone();
        Some(Self {
            request_id: 0,
            media_index: media_index as isize,
            media_sequence: pl.media_sequence + media_index as u64,
            playlist: playlist.clone(),
            timeline: segment.timeline,
            segment,
            start_of_segment,
            timestamp_offset: None,
            is_sync_request,
            bytes: None,
            byte_length: 0,
            timings: SegmentTimings::default(),
        })
    }

    pub fn media_index(&self) -> isize {
        self.media_index
    }

    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    pub fn playlist(&self) -> &PlaylistRef {
        &self.playlist
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn timeline(&self) -> u64 {
        self.timeline
    }

    pub fn start_of_segment(&self) -> Option<f64> {
        self.start_of_segment
    }

    pub fn timestamp_offset(&self) -> Option<f64> {
        self.timestamp_offset
    }

    pub fn is_sync_request(&self) -> bool {
        self.is_sync_request
    }

    pub fn timings(&self) -> &SegmentTimings {
        &self.timings
    }

    /// Index of that segment in its playlist, `None` if it expired from it.
    pub(crate) fn segment_index(&self) -> Option<usize> {
        usize::try_from(self.media_index).ok()
    }
}
