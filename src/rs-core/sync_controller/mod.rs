use std::collections::HashMap;

use crate::environment::SegmentTimingInfo;
use crate::playlist::{Playlist, SyncInfo};
use crate::segment_loader::SegmentInfo;
use crate::Logger;

/// The different ways a `SyncPoint` may be deduced, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStrategy {
    /// The playlist has an end, its first segment starts at `0`.
    Vod,

    /// Wall-clock time of the playlist's first segment, translated with the mapping learned
    /// on the first playlist announcing one.
    ProgramDateTime,

    /// A segment of the current timeline has already been loaded and probed.
    Segment,

    /// The start of a discontinuity has been guessed or learned.
    Discontinuity,

    /// The playlist inherited timing information when it was refreshed.
    Playlist,
}

const STRATEGIES: [SyncStrategy; 5] = [
    SyncStrategy::Vod,
    SyncStrategy::ProgramDateTime,
    SyncStrategy::Segment,
    SyncStrategy::Discontinuity,
    SyncStrategy::Playlist,
];

/// Correspondence between a segment index in a playlist and a presentation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncPoint {
    pub time: f64,
    pub segment_index: isize,
    pub strategy: SyncStrategy,
}

/// Offset between a timeline's internal media time and the presentation time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineMapping {
    /// Presentation time at which the mapping was learned.
    pub time: f64,

    /// To add to an internal media time to obtain the presentation time.
    pub mapping: f64,
}

/// Guessed presentation time at which a discontinuity starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiscontinuitySyncInfo {
    pub time: f64,

    /// Distance, in number of segments, between that discontinuity and the segment from
    /// which it was guessed. `0` when known for sure.
    pub accuracy: usize,
}

/// Keeps track of the timing information learned on loaded segments, to know where in the
/// presentation timeline other segments, from any playlist, should be.
///
/// Learned information is kept per timeline and not per playlist so it survives playlist
/// refreshes and rendition switches.
#[derive(Debug, Default)]
pub struct SyncController {
    timelines: HashMap<u64, TimelineMapping>,
    discontinuities: HashMap<u64, DiscontinuitySyncInfo>,

    /// To add to a wall-clock time, in seconds, to obtain a presentation time.
    datetime_to_display_time: Option<f64>,
}

impl SyncController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the `SyncPoint` of `playlist` closest to `target_time`, `None` if nothing allows
    /// to place that playlist in the presentation timeline yet.
    ///
    /// # Arguments
    ///
    /// * `playlist` - The playlist segments are going to be loaded from.
    ///
    /// * `target_time` - Presentation time, in seconds, around which segments will be loaded.
    ///
    /// * `current_timeline` - Timeline of the last segment loaded, if any.
    pub fn get_sync_point(
        &self,
        playlist: &Playlist,
        target_time: f64,
        current_timeline: Option<u64>,
    ) -> Option<SyncPoint> {
        let candidates = self.run_strategies(playlist, target_time, current_timeline);
        let sync_point = select_closest(&candidates, |c| (c.time - target_time).abs())?;
        Logger::lazy_debug(&|| {
            format!(
                "Sync: {:?} sync point for {}: time {} at index {}",
                sync_point.strategy, target_time, sync_point.time, sync_point.segment_index
            )
        });
        Some(sync_point)
    }

    /// Returns the presentation time, in seconds, at which the first segment of `playlist`
    /// starts, which is the amount of time that expired from it.
    pub fn expired_time(&self, playlist: &Playlist) -> Option<f64> {
        let candidates =
            self.run_strategies(playlist, 0., Some(playlist.discontinuity_sequence));
        let sync_point = select_closest(&candidates, |c| c.segment_index.abs() as f64)?;
        let durations = playlist.sum_durations(sync_point.segment_index, 0);
        let first_segment_start = if sync_point.segment_index > 0 {
            sync_point.time - durations
        } else {
            sync_point.time + durations
        };
        Some(first_segment_start.max(0.))
    }

    /// To call when `new_playlist` replaces `old_playlist`. Saves, as the new playlist's
    /// `sync_info`, the timing of the last segment that expired in between and whose start
    /// is known.
    ///
    /// Returns `true` if such segment was found.
    pub fn save_expired_segment_info(
        &self,
        old_playlist: &Playlist,
        new_playlist: &mut Playlist,
    ) -> bool {
        let expired = new_playlist
            .media_sequence
            .saturating_sub(old_playlist.media_sequence)
            .min(old_playlist.segments.len() as u64);
        for idx in (0..expired).rev() {
            if let Some(start) = old_playlist.segments[idx as usize].start {
                new_playlist.sync_info = Some(SyncInfo {
                    media_sequence: old_playlist.media_sequence + idx,
                    time: start,
                });
                Logger::debug(&format!(
                    "Sync: saved expired segment {} starting at {}",
                    old_playlist.media_sequence + idx,
                    start
                ));
                return true;
            }
        }
        false
    }

    /// Record, once for the whole session, how wall-clock times announced by playlists
    /// translate into presentation times.
    pub fn set_date_time_mapping(&mut self, playlist: &Playlist) {
        if self.datetime_to_display_time.is_none() {
            if let Some(date_time) = playlist.date_time {
                self.datetime_to_display_time = Some(-date_time);
            }
        }
    }

    pub fn mapping_for_timeline(&self, timeline: u64) -> Option<f64> {
        self.timelines.get(&timeline).map(|t| t.mapping)
    }

    pub fn discontinuity_sync_info(&self, discontinuity: u64) -> Option<&DiscontinuitySyncInfo> {
        self.discontinuities.get(&discontinuity)
    }

    /// Use the internal timing of a just-loaded segment to compute its presentation `start`
    /// and `end`, written both on `segment_info` and on the corresponding playlist segment.
    ///
    /// Returns `false` if no mapping is known for the segment's timeline and none could be
    /// deduced, in which case nothing is learned.
    pub fn probe_segment_info(
        &mut self,
        segment_info: &mut SegmentInfo,
        timing: &SegmentTimingInfo,
    ) -> bool {
        let mapping = match segment_info.timestamp_offset {
            Some(offset) => {
                let mapping = TimelineMapping {
                    time: offset,
                    mapping: offset - timing.start,
                };
                self.timelines.insert(segment_info.timeline, mapping);
                Logger::debug(&format!(
                    "Sync: new mapping {} for timeline {}",
                    mapping.mapping, segment_info.timeline
                ));
                mapping.mapping
            }
            None => match self.mapping_for_timeline(segment_info.timeline) {
                Some(mapping) => mapping,
                None => return false,
            },
        };

        let start = timing.start + mapping;
        let end = timing.end + mapping;
        segment_info.segment.start = Some(start);
        segment_info.segment.end = Some(end);

        let playlist_ref = segment_info.playlist.clone();
        let mut playlist = playlist_ref.borrow_mut();
        if let Some(segment) = segment_info
            .segment_index()
            .and_then(|idx| playlist.segments.get_mut(idx))
        {
            segment.start = Some(start);
            segment.end = Some(end);
        }
        self.save_discontinuity_sync_info(&playlist, segment_info);
        if playlist.sync_info.is_none() {
            playlist.sync_info = Some(SyncInfo {
                media_sequence: segment_info.media_sequence,
                time: start,
            });
        }
        true
    }

    fn save_discontinuity_sync_info(&mut self, playlist: &Playlist, segment_info: &SegmentInfo) {
        let segment = &segment_info.segment;
        let (Some(start), Some(end)) = (segment.start, segment.end) else {
            return;
        };
        if segment.discontinuity {
            self.discontinuities.insert(
                segment.timeline,
                DiscontinuitySyncInfo {
                    time: start,
                    accuracy: 0,
                },
            );
            return;
        }
        let media_index = segment_info.media_index;
        for (i, disc_start) in playlist.discontinuity_starts.iter().enumerate() {
            let discontinuity = playlist.discontinuity_sequence + i as u64 + 1;
            let index_diff = *disc_start as isize - media_index;
            let accuracy = index_diff.unsigned_abs();
            let improves = self
                .discontinuities
                .get(&discontinuity)
                .map_or(true, |known| known.accuracy > accuracy);
            if improves {
                let time = if index_diff < 0 {
                    start - playlist.sum_durations(media_index, *disc_start as isize)
                } else {
                    end + playlist.sum_durations(media_index + 1, *disc_start as isize)
                };
                self.discontinuities
                    .insert(discontinuity, DiscontinuitySyncInfo { time, accuracy });
            }
        }
    }

    fn run_strategies(
        &self,
        playlist: &Playlist,
        target_time: f64,
        current_timeline: Option<u64>,
    ) -> Vec<SyncPoint> {
        STRATEGIES
            .iter()
            .filter_map(|strategy| {
                self.run_strategy(*strategy, playlist, target_time, current_timeline)
                    .map(|(time, segment_index)| SyncPoint {
                        time,
                        segment_index,
                        strategy: *strategy,
                    })
            })
            .collect()
    }

    fn run_strategy(
        &self,
        strategy: SyncStrategy,
        playlist: &Playlist,
        target_time: f64,
        current_timeline: Option<u64>,
    ) -> Option<(f64, isize)> {
        match strategy {
            SyncStrategy::Vod => {
                if playlist.duration().is_finite() {
                    Some((0., 0))
                } else {
                    None
                }
            }
            SyncStrategy::ProgramDateTime => {
                let offset = self.datetime_to_display_time?;
                let date_time = playlist.date_time?;
                Some((date_time + offset, 0))
            }
            SyncStrategy::Segment => {
                let timeline = current_timeline?;
                let known_starts = playlist
                    .segments
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.timeline == timeline)
                    .filter_map(|(idx, s)| s.start.map(|start| (start, idx as isize)));
                closest_in_scan(known_starts, target_time)
            }
            SyncStrategy::Discontinuity => {
                let known_starts = playlist
                    .discontinuity_starts
                    .iter()
                    .enumerate()
                    .filter_map(|(i, segment_index)| {
                        let discontinuity = playlist.discontinuity_sequence + i as u64 + 1;
                        self.discontinuities
                            .get(&discontinuity)
                            .map(|info| (info.time, *segment_index as isize))
                    });
                closest_in_scan(known_starts, target_time)
            }
            SyncStrategy::Playlist => {
                let sync_info = playlist.sync_info?;
                let index = sync_info.media_sequence as i128 - playlist.media_sequence as i128;
                Some((sync_info.time, index as isize))
            }
        }
    }
}

/// Scan `(time, index)` candidates in order and keep the one closest to `target_time`,
/// stopping as soon as candidates begin to get further away.
fn closest_in_scan(
    candidates: impl Iterator<Item = (f64, isize)>,
    target_time: f64,
) -> Option<(f64, isize)> {
    let mut best: Option<(f64, isize)> = None;
    let mut last_distance: Option<f64> = None;
    for (time, index) in candidates {
        let distance = (target_time - time).abs();
        match last_distance {
            Some(last) if last < distance => break,
            _ => {
                best = Some((time, index));
                last_distance = Some(distance);
            }
        }
    }
    best
}

/// On equal distances the first candidate wins.
fn select_closest(candidates: &[SyncPoint], distance: impl Fn(&SyncPoint) -> f64) -> Option<SyncPoint> {
    let mut best: Option<(SyncPoint, f64)> = None;
    for candidate in candidates {
        let dist = distance(candidate);
        if best.map_or(true, |(_, best_dist)| dist < best_dist) {
            best = Some((*candidate, dist));
        }
    }
    best.map(|(point, _)| point)
}
