use std::{cell::RefCell, rc::Rc};

use serde::Deserialize;
use thiserror::Error;

/// Allowed fudge, in seconds, when looking for the segment containing a given time.
const TIME_FUDGE_FACTOR: f64 = 1. / 30.;

/// A Media Playlist shared between the loader, its pending request and the host.
///
/// Timing information learned on segments is written in place, so it survives for as long as
/// that playlist object is referenced.
pub type PlaylistRef = Rc<RefCell<Playlist>>;

/// Inclusive range of bytes of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteRange {
    pub first_byte: usize,
    pub last_byte: usize,
}

/// Decryption key of a segment.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct KeyInfo {
    pub uri: String,

    /// Initialization vector. When absent, the segment's media sequence number is used.
    #[serde(default)]
    pub iv: Option<[u8; 16]>,
}

/// Initialization segment of a segment.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapInfo {
    pub uri: String,
    #[serde(default)]
    pub byte_range: Option<ByteRange>,
}

impl MapInfo {
    pub fn id(&self) -> InitSegmentId {
        InitSegmentId {
            uri: self.uri.clone(),
            byte_range: self.byte_range.clone(),
        }
    }
}

/// Identity of an initialization segment, which may be shared by many segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InitSegmentId {
    uri: String,
    byte_range: Option<ByteRange>,
}

impl InitSegmentId {
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub uri: String,
    #[serde(default)]
    pub byte_range: Option<ByteRange>,

    /// Duration announced by the playlist, in seconds.
    pub duration: f64,

    /// Identifier of the discontinuity group this segment is part of.
    #[serde(default)]
    pub timeline: u64,

    /// Presentation time at which the segment starts, only known once loaded and probed.
    #[serde(skip)]
    pub start: Option<f64>,

    /// Presentation time at which the segment ends, only known once loaded and probed.
    #[serde(skip)]
    pub end: Option<f64>,

    #[serde(default)]
    pub key: Option<KeyInfo>,
    #[serde(default)]
    pub map: Option<MapInfo>,

    /// If `true`, the encoding timeline resets at this segment.
    #[serde(default)]
    pub discontinuity: bool,
}

impl Segment {
    pub fn new(uri: &str, duration: f64) -> Self {
        Self {
            uri: uri.to_owned(),
            byte_range: None,
            duration,
            timeline: 0,
            start: None,
            end: None,
            key: None,
            map: None,
            discontinuity: false,
        }
    }
}

/// Correspondence between a media sequence number and a presentation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncInfo {
    pub media_sequence: u64,
    pub time: f64,
}

/// Result of `Playlist::media_info_for_time`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaInfo {
    pub media_index: usize,
    pub start_time: f64,
}

#[derive(Error, Debug)]
pub enum PlaylistParseError {
    #[error("Invalid playlist description: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Playlist has no valid target duration")]
    InvalidTargetDuration,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub uri: String,

    /// Media sequence number of the first segment.
    pub media_sequence: u64,

    pub target_duration: f64,
    #[serde(default)]
    pub discontinuity_sequence: u64,

    /// Indexes of the segments at which the encoding timeline resets.
    #[serde(default)]
    pub discontinuity_starts: Vec<usize>,

    /// If `true`, no segment will be added anymore to that playlist.
    #[serde(default)]
    pub end_list: bool,

    /// Wall-clock time, in seconds, at which the first segment starts, if announced.
    #[serde(default)]
    pub date_time: Option<f64>,

    /// Timing learned before this playlist was refreshed.
    #[serde(skip)]
    pub sync_info: Option<SyncInfo>,

    pub segments: Vec<Segment>,
}

impl Playlist {
    /// Creates a new `Playlist`, deducing each segment's timeline and the discontinuity
    /// starts from the `discontinuity` flag of its segments.
    pub fn new(
        uri: &str,
        media_sequence: u64,
        discontinuity_sequence: u64,
        target_duration: f64,
        segments: Vec<Segment>,
        end_list: bool,
    ) -> Self {
        let mut playlist = Self {
            uri: uri.to_owned(),
            media_sequence,
            target_duration,
            discontinuity_sequence,
            discontinuity_starts: vec![],
            end_list,
            date_time: None,
            sync_info: None,
            segments,
        };
        playlist.compute_timelines();
        playlist
    }

    /// Parse a playlist from its JSON description, as produced by an external manifest
    /// parser.
    pub fn from_json(json: &str) -> Result<Self, PlaylistParseError> {
        let mut playlist: Playlist = serde_json::from_str(json)?;
        if playlist.target_duration.is_nan() || playlist.target_duration <= 0. {
            return Err(PlaylistParseError::InvalidTargetDuration);
        }
        playlist.compute_timelines();
        Ok(playlist)
    }

    pub fn into_ref(self) -> PlaylistRef {
        Rc::new(RefCell::new(self))
    }

    fn compute_timelines(&mut self) {
        let mut timeline = self.discontinuity_sequence;
        self.discontinuity_starts.clear();
        for (idx, segment) in self.segments.iter_mut().enumerate() {
            if segment.discontinuity {
                timeline += 1;
                self.discontinuity_starts.push(idx);
            }
            segment.timeline = timeline;
        }
    }

    /// Total duration of the playlist in seconds, infinite if it may still evolve.
    pub fn duration(&self) -> f64 {
        if self.end_list {
            self.segments.iter().map(|s| s.duration).sum()
        } else {
            f64::INFINITY
        }
    }

    /// Sum of the durations of segments from `start_index` (inclusive) to `end_index`
    /// (exclusive), in any order.
    ///
    /// Negative indexes refer to segments which are not in the playlist anymore, they are
    /// counted as lasting the target duration.
    pub fn sum_durations(&self, start_index: isize, end_index: isize) -> f64 {
        let (mut start, end) = if start_index > end_index {
            (end_index, start_index)
        } else {
            (start_index, end_index)
        };
        let mut durations = 0.;
        if start < 0 {
            durations += (start..end.min(0)).count() as f64 * self.target_duration;
            start = 0;
        }
        for idx in start..end {
            if let Some(segment) = self.segments.get(idx as usize) {
                durations += segment.duration;
            }
        }
        durations
    }

    /// Find the index of the segment which should contain `time`, by accumulating segment
    /// durations from a segment whose index and start time are known.
    ///
    /// `start_index` may be negative if the known segment has already expired from the
    /// playlist.
    pub fn media_info_for_time(
        &self,
        time: f64,
        start_index: isize,
        start_time: f64,
    ) -> MediaInfo {
        let len = self.segments.len() as isize;
        let mut time = time - start_time;

        if time < 0. {
            // Walk backward from the known segment
            if start_index > 0 {
                for idx in (0..start_index.min(len)).rev() {
                    time += self.segments[idx as usize].duration + TIME_FUDGE_FACTOR;
                    if time > 0. {
                        return MediaInfo {
                            media_index: idx as usize,
                            start_time: start_time - self.sum_durations(start_index, idx),
                        };
                    }
                }
            }
            return MediaInfo {
                media_index: 0,
                start_time: start_time - self.sum_durations(start_index, 0),
            };
        }

        let mut first = start_index;
        if first < 0 {
            for _ in first..0 {
                time -= self.target_duration;
                if time < 0. {
                    return MediaInfo {
                        media_index: 0,
                        start_time: start_time + self.sum_durations(start_index, 0),
                    };
                }
            }
            first = 0;
        }

        for idx in first..len {
            time -= self.segments[idx as usize].duration + TIME_FUDGE_FACTOR;
            if time < 0. {
                return MediaInfo {
                    media_index: idx as usize,
                    start_time: start_time + self.sum_durations(start_index, idx),
                };
            }
        }

        let last = (len - 1).max(0);
        MediaInfo {
            media_index: last as usize,
            start_time: start_time + self.sum_durations(start_index, last),
        }
    }

    /// Copy the start and end times learned on the segments of `previous`, an older version
    /// of the same playlist, to the segments both versions share.
    pub fn inherit_timings(&mut self, previous: &Playlist) {
        let diff = self.media_sequence as i128 - previous.media_sequence as i128;
        for (idx, segment) in self.segments.iter_mut().enumerate() {
            let Some(old) = usize::try_from(idx as i128 + diff)
                .ok()
                .and_then(|old_idx| previous.segments.get(old_idx))
            else {
                continue;
            };
            if segment.start.is_none() {
                segment.start = old.start;
            }
            if segment.end.is_none() {
                segment.end = old.end;
            }
        }
    }
}
