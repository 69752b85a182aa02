use super::{LoaderError, LoaderState, SegmentLoader};
use crate::{
    decrypter::DecryptionError,
    environment::{Clock, DecryptionId, Decrypter, Environment, FetchResult, RequestId, TimerId},
    events::LoaderEvent,
    media_element::SourceBufferQueueElement,
    requester::{LoadedSegment, RequestError, RequestErrorKind},
    Logger,
};

/// Methods the environment calls once an operation it started on the loader's behalf ended.
impl<E: Environment> SegmentLoader<E> {
    /// The environment should call this method each time a request started through
    /// `Transport::fetch` ended, whatever its outcome. Aborted requests should not be reported.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier returned by `Transport::fetch` when the request was
    ///   started.
    ///
    /// * `result` - The loaded data, or the reason why it could not be loaded.
    pub fn on_request_finished(&mut self, request_id: RequestId, result: FetchResult) {
        if self.state == LoaderState::Disposed {
            return;
        }
        let Some(request) = self.segment_request.as_mut() else {
            Logger::debug(&format!("SegmentLoader: unknown request {} ended", request_id));
            return;
        };
        if !request.is_pending(request_id) {
            Logger::debug(&format!("SegmentLoader: unknown request {} ended", request_id));
            return;
        }
        let Some(outcome) = request.on_request_finished(&mut self.transport, request_id, result)
        else {
            return;
        };
        self.segment_request = None;
        match outcome {
            Ok(loaded) => self.on_segment_loaded(loaded),
            Err(error) => self.on_segment_request_error(error),
        }
    }

    /// The environment should call this method once a job started through
    /// `Decrypter::decrypt` ended.
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier given to `Decrypter::decrypt`.
    ///
    /// * `result` - The decrypted data, without its padding.
    pub fn on_decrypted(&mut self, id: DecryptionId, result: Result<Vec<u8>, DecryptionError>) {
        if self.state == LoaderState::Disposed {
            return;
        }
        let Some(segment_info) = self
            .pending_segment
            .as_mut()
            .filter(|p| p.request_id == id && p.bytes.is_none())
        else {
            Logger::debug(&format!("SegmentLoader: ignoring decryption job {}", id));
            return;
        };
        match result {
            Ok(data) => {
                segment_info.timings.decrypt_end = Some(self.clock.now());
                segment_info.bytes = Some(data);
                self.handle_segment();
            }
            Err(err) => {
                let url = segment_info.segment.uri.clone();
                self.on_segment_error(LoaderError::from_decryption_error(&url, err));
            }
        }
    }

    /// The environment should call this method each time the `MediaBuffer` ended an
    /// `append_buffer` or `remove` operation.
    pub fn on_buffer_update_end(&mut self) {
        if self.state == LoaderState::Disposed {
            return;
        }
        match self.source_buffer.on_update_end() {
            Some(SourceBufferQueueElement::PushMedia(request_id)) => {
                self.handle_update_end(request_id)
            }
            Some(SourceBufferQueueElement::PushInit(id)) => {
                Logger::debug(&format!("SegmentLoader: pushed init segment {}", id.uri()));
            }
            Some(SourceBufferQueueElement::Remove { start, end }) => {
                Logger::debug(&format!("SegmentLoader: removed data from {} to {}", start, end));
            }
            None => {}
        }
    }

    /// The environment should call this method once a timer started through
    /// `Clock::start_timer` ended.
    pub fn on_timer_ended(&mut self, id: TimerId) {
        if self.check_buffer_timer != Some(id) {
            return;
        }
        self.check_buffer_timer = None;
        if self.state != LoaderState::Disposed {
            self.monitor_buffer_tick();
        }
    }

    fn on_segment_loaded(&mut self, loaded: LoadedSegment) {
        let Some(mut segment_info) = self.pending_segment.take() else {
            return;
        };
        let now = self.clock.now();
        let stats = &loaded.stats;
        self.stats.media_requests += 1;
        self.stats.media_bytes_transferred += stats.bytes_received;
        self.stats.media_transfer_duration += stats.round_trip_time;
        self.stats.bandwidth = Some(stats.bandwidth);
        self.stats.round_trip = Some(stats.round_trip_time);
        self.bandwidth_estimator
            .add_sample(stats.round_trip_time, stats.bytes_received);
        segment_info.timings.end_of_all_requests = Some(now);
        segment_info.byte_length = stats.bytes_received;

        if let (Some(key), Some(key_info)) = (loaded.key, segment_info.segment.key.as_ref()) {
            self.keys.insert(key_info.uri.clone(), key);
        }
        if let (Some(init_segment), Some(map)) =
            (loaded.init_segment, segment_info.segment.map.as_ref())
        {
            self.init_segments.insert(map.id(), init_segment);
        }

        let Some(key_info) = segment_info.segment.key.clone() else {
            segment_info.bytes = Some(loaded.data);
            self.pending_segment = Some(segment_info);
            self.handle_segment();
            return;
        };
        let Some(key) = self.keys.get(&key_info.uri).copied() else {
            self.on_segment_error(LoaderError::InvalidKey { url: key_info.uri });
            return;
        };
        // Without an explicit IV, the media sequence number is used
        let iv = key_info
            .iv
            .unwrap_or_else(|| u128::from(segment_info.media_sequence).to_be_bytes());
        let request_id = segment_info.request_id;
        segment_info.timings.decrypt_start = Some(now);
        self.pending_segment = Some(segment_info);
        self.decrypter.decrypt(request_id, loaded.data, key, iv);
    }

    fn on_segment_request_error(&mut self, error: RequestError) {
        self.stats.media_requests += 1;
        self.pending_segment = None;
        match error.kind {
            RequestErrorKind::Aborted => {
                Logger::info(&format!("SegmentLoader: {}", error));
                self.stats.media_requests_aborted += 1;
                self.set_state(LoaderState::Ready);
                self.monitor_buffer_if_unpaused();
            }
            RequestErrorKind::Timeout => {
                Logger::warn(&format!("SegmentLoader: {}", error));
                self.stats.media_requests_timedout += 1;
                let minimum = self.config.minimum_bandwidth;
                self.bandwidth_estimator.force_minimum(minimum);
                self.stats.bandwidth = Some(minimum);
                self.stats.round_trip = None;
                self.notifier.emit(LoaderEvent::BandwidthUpdate);
                self.update_rendition();
                self.set_state(LoaderState::Ready);
                self.monitor_buffer_if_unpaused();
            }
            RequestErrorKind::NetworkFailure
            | RequestErrorKind::EmptyContent
            | RequestErrorKind::InvalidKey => {
                self.on_segment_error(LoaderError::from(error));
            }
        }
    }
}
