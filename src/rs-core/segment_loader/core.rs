use super::{LoaderError, LoaderState, SegmentInfo, SegmentLoader};
use crate::{
    environment::{Clock, Demuxer, Environment},
    events::LoaderEvent,
    playlist::{Playlist, PlaylistRef},
    requester::SegmentRequest,
    sync_controller::SyncPoint,
    utils::time_ranges::TimeRanges,
    Logger,
};

impl<E: Environment> SegmentLoader<E> {
    /// Regular buffer check: load the next segment if the loader is idle, then check again
    /// later if still idle.
    pub(super) fn monitor_buffer_tick(&mut self) {
        if self.state == LoaderState::Ready {
            self.fill_buffer();
        }
        if self.state == LoaderState::Ready && !self.paused {
            let delay = self.config.check_buffer_delay;
            self.check_buffer_timer = Some(self.clock.start_timer(delay));
        }
    }

    /// Start loading the next segment, if one is needed.
    pub(super) fn fill_buffer(&mut self) {
        if self.source_buffer.updating() {
            return;
        }
        let Some(playlist) = self.playlist.clone() else {
            return;
        };
        if self.sync_point.is_none() {
            self.sync_point = self.sync_controller.get_sync_point(
                &playlist.borrow(),
                self.observation.current_time,
                self.current_timeline,
            );
        }

        let buffered = self.source_buffer.buffered();
        let Some(mut segment_info) = self.check_buffer(
            &buffered,
            &playlist,
            self.media_index,
            self.observation.has_played,
            self.observation.current_time,
            self.sync_point,
        ) else {
            return;
        };

        let last_index = playlist.borrow().segments.len() as isize - 1;
        if self.ended && !self.observation.seeking && segment_info.media_index == last_index {
            return;
        }

        let starts_before_offset = segment_info
            .start_of_segment
            .map_or(false, |start| start < self.source_buffer.timestamp_offset());
        if Some(segment_info.timeline) != self.current_timeline || starts_before_offset {
            segment_info.timestamp_offset = segment_info.start_of_segment;
        }
        self.load_segment(segment_info);
    }

    /// Determine the next segment to load, `None` if nothing has to be loaded for now.
    ///
    /// # Arguments
    ///
    /// * `buffered` - Time ranges currently buffered.
    ///
    /// * `playlist` - The playlist to load segments from.
    ///
    /// * `media_index` - Index in `playlist` of the last segment pushed, if known.
    ///
    /// * `has_played` - If `false`, only a small amount of media is buffered, enough to start
    ///   playback.
    ///
    /// * `current_time` - The current playback position, in seconds.
    ///
    /// * `sync_point` - Where `playlist` is known to be in the presentation timeline. If
    ///   `None`, a segment will be loaded just to learn it.
    pub fn check_buffer(
        &self,
        buffered: &TimeRanges,
        playlist: &PlaylistRef,
        media_index: Option<isize>,
        has_played: bool,
        current_time: f64,
        sync_point: Option<SyncPoint>,
    ) -> Option<SegmentInfo> {
        let pl = playlist.borrow();
        if pl.segments.is_empty() {
            return None;
        }

        let last_buffered_end = buffered.last_end().unwrap_or(0.);
        let buffered_time = (last_buffered_end - current_time).max(0.);
        if buffered_time >= self.config.goal_buffer_length {
            return None;
        }
        if !has_played && buffered_time >= 1. {
            return None;
        }

        let Some(sync_point) = sync_point else {
            let candidate = self.sync_segment_candidate(&pl);
            drop(pl);
            Logger::debug(&format!(
                "SegmentLoader: no sync point, loading segment {} to learn timings",
                candidate
            ));
            return SegmentInfo::new(playlist, candidate, None, true);
        };

        // A last segment which expired in the meantime gives no clue on the next one
        if let Some(next_index) = media_index.and_then(|idx| usize::try_from(idx + 1).ok()) {
            let start_of_segment = next_index
                .checked_sub(1)
                .and_then(|idx| pl.segments.get(idx))
                .and_then(|s| s.end)
                .unwrap_or(last_buffered_end);
            drop(pl);
            return SegmentInfo::new(playlist, next_index, Some(start_of_segment), false);
        }

        let target_time = if self.fetch_at_buffer {
            last_buffered_end
        } else {
            current_time
        };
        let media_info =
            pl.media_info_for_time(target_time, sync_point.segment_index, sync_point.time);
        drop(pl);
        SegmentInfo::new(
            playlist,
            media_info.media_index,
            Some(media_info.start_time),
            false,
        )
    }

    /// Segment to load to learn timing information: preferably the second segment of the
    /// current timeline, as the first one might be truncated.
    fn sync_segment_candidate(&self, playlist: &Playlist) -> usize {
        let Some(timeline) = self.current_timeline else {
            return 0;
        };
        let on_timeline: Vec<usize> = playlist
            .segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.timeline == timeline)
            .map(|(idx, _)| idx)
            .collect();
        match on_timeline.len() {
            0 => playlist.segments.len().saturating_sub(1),
            len => on_timeline[len.min(2) - 1],
        }
    }

    /// Request every resource needed for `segment_info`.
    fn load_segment(&mut self, mut segment_info: SegmentInfo) {
        self.trim_back_buffer();
        segment_info.request_id = self.next_request_id();
        segment_info.timings.request_start = Some(self.clock.now());

        let segment = &segment_info.segment;
        let load_key = segment
            .key
            .as_ref()
            .map_or(false, |k| !self.keys.contains_key(&k.uri));
        let load_init_segment = segment
            .map
            .as_ref()
            .map_or(false, |m| !self.init_segments.contains_key(&m.id()));
        Logger::info(&format!(
            "SegmentLoader: loading segment {} (index: {}, timeline: {}, sync: {})",
            segment.uri,
            segment_info.media_index,
            segment_info.timeline,
            segment_info.is_sync_request
        ));
        let request = SegmentRequest::start(
            &mut self.transport,
            segment,
            load_key,
            load_init_segment,
            self.config.segment_request_timeout,
        );
        self.segment_request = Some(request);
        self.pending_segment = Some(segment_info);
        self.clear_check_buffer_timer();
        self.set_state(LoaderState::Waiting);
    }

    /// Remove data far enough behind the current position, never past the start of the
    /// seekable range.
    fn trim_back_buffer(&mut self) {
        let current_time = self.observation.current_time;
        let remove_to = match self.observation.seekable_start {
            Some(start) if start > 0. && start < current_time => start,
            _ => current_time - self.config.back_buffer_length,
        };
        if remove_to <= 0. {
            return;
        }
        let buffered_start = self.source_buffer.buffered().start(0);
        if buffered_start.map_or(false, |start| start < remove_to) {
            Logger::debug(&format!("SegmentLoader: trimming buffer until {}", remove_to));
            self.remove(0., remove_to);
        }
    }

    /// To call once the pending segment's data is available in clear.
    pub(super) fn handle_segment(&mut self) {
        let Some(mut segment_info) = self.pending_segment.take() else {
            return;
        };
        let Some(data) = segment_info.bytes.take() else {
            return;
        };

        let init_segment = segment_info
            .segment
            .map
            .as_ref()
            .and_then(|m| self.init_segments.get(&m.id()));
        let timing = match self
            .demuxer
            .probe(init_segment.map(|d| d.as_slice()), &data)
        {
            Ok(timing) => timing,
            Err(err) => {
                let error = LoaderError::from_probe_error(&segment_info.segment.uri, err);
                self.on_segment_error(error);
                return;
            }
        };
        let probed = timing.map_or(false, |t| {
            self.sync_controller.probe_segment_info(&mut segment_info, &t)
        });

        if segment_info.is_sync_request {
            Logger::debug(&format!(
                "SegmentLoader: sync request done, timings learned: {}",
                probed
            ));
            self.notifier.emit(LoaderEvent::SyncInfoUpdate);
            self.set_state(LoaderState::Ready);
            self.monitor_buffer_if_unpaused();
            return;
        }
        if !probed {
            Logger::warn(&format!(
                "SegmentLoader: no timing information for {}, pushing it anyway",
                segment_info.segment.uri
            ));
        }

        if let Some(offset) = segment_info.timestamp_offset {
            if offset != self.source_buffer.timestamp_offset() {
                self.source_buffer.set_timestamp_offset(offset);
                self.notifier.emit(LoaderEvent::TimestampOffset(offset));
            }
        }
        if let Some(mapping) = self.sync_controller.mapping_for_timeline(segment_info.timeline) {
            self.notifier.emit(LoaderEvent::SegmentTimeMapping {
                timeline: segment_info.timeline,
                mapping,
            });
        }

        self.set_state(LoaderState::Appending);
        if let Some(init_id) = segment_info.segment.map.as_ref().map(|m| m.id()) {
            if self.active_init_segment.as_ref() != Some(&init_id) {
                if let Some(init_data) = self.init_segments.get(&init_id) {
                    self.source_buffer
                        .push_init_segment(init_id.clone(), init_data.clone());
                }
                self.active_init_segment = Some(init_id);
            }
        }

        let segment = &segment_info.segment;
        self.stats.media_seconds_loaded += match (segment.start, segment.end) {
            (Some(start), Some(end)) => end - start,
            _ => segment.duration,
        };
        segment_info.byte_length = data.len();
        self.source_buffer
            .push_media_segment(segment_info.request_id, data);
        self.pending_segment = Some(segment_info);
    }

    /// To call once the media segment with the given id has been pushed to the buffer.
    pub(super) fn handle_update_end(&mut self, request_id: u64) {
        let is_pending = self
            .pending_segment
            .as_ref()
            .map_or(false, |p| p.request_id == request_id);
        let segment_info = match self.pending_segment.take() {
            Some(segment_info) if is_pending => segment_info,
            other => {
                self.pending_segment = other;
                if self.state == LoaderState::Appending {
                    self.set_state(LoaderState::Ready);
                    self.monitor_buffer_if_unpaused();
                }
                return;
            }
        };

        let is_walking_forward = self.media_index.is_some();
        self.record_throughput(&segment_info);
        self.set_state(LoaderState::Ready);
        self.media_index = Some(segment_info.media_index);
        self.fetch_at_buffer = true;
        self.current_timeline = Some(segment_info.timeline);
        self.notifier.emit(LoaderEvent::SyncInfoUpdate);

        let (target_duration, segment_count, end_list) = {
            let pl = segment_info.playlist.borrow();
            (pl.target_duration, pl.segments.len(), pl.end_list)
        };
        if let Some(end) = segment_info.segment.end {
            let drift = self.observation.current_time - end;
            if drift > target_duration * self.config.resync_target_duration_factor {
                Logger::warn(&format!(
                    "SegmentLoader: loaded segment ends {}s behind the current position",
                    drift
                ));
                self.reset_everything();
                self.monitor_buffer_if_unpaused();
                return;
            }
        }

        if is_walking_forward {
            self.notifier.emit(LoaderEvent::BandwidthUpdate);
            self.update_rendition();
        }
        self.notifier.emit(LoaderEvent::Progress);

        if end_list && usize::try_from(segment_info.media_index + 1).ok() == Some(segment_count) {
            self.end_of_stream();
        }
        self.monitor_buffer_if_unpaused();
    }

    fn end_of_stream(&mut self) {
        if self.ended {
            return;
        }
        Logger::info("SegmentLoader: last segment pushed, ending the stream");
        self.ended = true;
        self.source_buffer.end_of_stream();
        self.notifier.emit(LoaderEvent::Ended);
    }

    /// Rate, in bits per second, at which the segment went from loaded to pushed.
    fn record_throughput(&mut self, segment_info: &SegmentInfo) {
        let Some(end_of_requests) = segment_info.timings.end_of_all_requests else {
            return;
        };
        let processing_time = self.clock.now() - end_of_requests + 1.;
        let rate = (segment_info.byte_length as f64 / processing_time * 8. * 1000.).floor();
        self.stats.throughput.add_sample(rate);
    }

    /// Report an error preventing the segment from being loaded, counted as an errored
    /// request. Another rendition is chosen if some were announced.
    pub(super) fn on_segment_error(&mut self, error: LoaderError) {
        self.stats.media_requests_errored += 1;
        self.on_fatal_error(error);
        self.blacklist_current_rendition();
    }

    /// Report an error preventing the loader from going further. Loading is paused until
    /// `load` is called again.
    pub(super) fn on_fatal_error(&mut self, error: LoaderError) {
        Logger::error(&format!("SegmentLoader: {}", error));
        self.pending_segment = None;
        self.error = Some(error.clone());
        self.set_state(LoaderState::Ready);
        self.pause();
        self.notifier.emit(LoaderEvent::Error(error));
    }
}
