use std::{collections::HashMap, rc::Rc, sync::mpsc::Receiver};

use thiserror::Error;

use crate::{
    adaptive::{BandwidthEstimator, RenditionSelector},
    config::{LoaderConfiguration, SelectorConfiguration},
    decrypter::DecryptionError,
    environment::{Clock, Environment, ProbeError, TimerId},
    events::{LoaderEvent, Notifier},
    media_element::SourceBufferQueue,
    playlist::{InitSegmentId, PlaylistRef, SyncInfo},
    requester::{RequestError, RequestErrorKind, SegmentRequest},
    sync_controller::{SyncController, SyncPoint},
    Logger,
};

mod core;
mod event_listeners;
mod renditions;
mod segment_info;
mod stats;
#[cfg(test)]
mod tests;

pub use segment_info::{SegmentInfo, SegmentTimings};
pub use stats::{LoaderStats, Throughput};

/// State of a `SegmentLoader`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderState {
    /// No playlist has been given yet, or loading has never been started.
    Init,

    /// Idle, the buffer is regularly checked to know if a segment should be loaded.
    Ready,

    /// A segment is being requested, and decrypted if needed.
    Waiting,

    /// A loaded segment is being pushed to the buffer.
    Appending,

    /// The `SegmentLoader` cannot be used anymore.
    Disposed,
}

/// Error reported through a `LoaderEvent::Error` event.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum LoaderError {
    #[error("Network failure when loading {url} (status: {status:?})")]
    NetworkFailure { url: String, status: Option<u32> },
    #[error("Request timeout when loading {url}")]
    Timeout { url: String },
    #[error("Request aborted when loading {url}")]
    Aborted { url: String },
    #[error("Empty segment loaded from {url}")]
    EmptyContent { url: String },
    #[error("Invalid decryption key loaded from {url}")]
    InvalidKey { url: String },
    #[error("Could not decode segment {url}: {reason}")]
    FatalDecodeError { url: String, reason: String },
    #[error("No rendition left to load after {url} failed")]
    NoAlternativeRendition { url: String },
}

impl From<RequestError> for LoaderError {
    fn from(err: RequestError) -> Self {
        let url = err.url;
        match err.kind {
            RequestErrorKind::NetworkFailure => LoaderError::NetworkFailure {
                url,
                status: err.status,
            },
            RequestErrorKind::Timeout => LoaderError::Timeout { url },
            RequestErrorKind::Aborted => LoaderError::Aborted { url },
            RequestErrorKind::EmptyContent => LoaderError::EmptyContent { url },
            RequestErrorKind::InvalidKey => LoaderError::InvalidKey { url },
        }
    }
}

impl LoaderError {
    pub(crate) fn from_probe_error(url: &str, err: ProbeError) -> Self {
        LoaderError::FatalDecodeError {
            url: url.to_owned(),
            reason: err.0,
        }
    }

    pub(crate) fn from_decryption_error(url: &str, err: DecryptionError) -> Self {
        LoaderError::FatalDecodeError {
            url: url.to_owned(),
            reason: err.to_string(),
        }
    }
}

/// Playback conditions, as regularly communicated by the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaObservation {
    /// Current playback position, in seconds.
    pub current_time: f64,

    /// If `true`, playback has started at least once.
    pub has_played: bool,

    pub seeking: bool,

    /// Start of the seekable range, in seconds, if known.
    pub seekable_start: Option<f64>,
}

/// Loads the segments of a playlist and pushes them to a media buffer, so that the buffer
/// stays filled ahead of the current position.
///
/// The `SegmentLoader` does nothing on its own: it reacts to calls of its API, to the
/// `on_*` methods its environment calls once an operation ended, and to the timer it
/// regularly starts to check the buffer.
pub struct SegmentLoader<E: Environment> {
    state: LoaderState,

    config: LoaderConfiguration,

    transport: E::Transport,
    decrypter: E::Decrypter,
    demuxer: E::Demuxer,
    clock: E::Clock,

    /// Serializes operations on the media buffer.
    source_buffer: SourceBufferQueue<E::Buffer>,

    /// Keeps track of timing information learned on loaded segments.
    sync_controller: SyncController,

    bandwidth_estimator: BandwidthEstimator,

    /// Chooses between the renditions announced by the host, if any.
    rendition_selector: RenditionSelector,

    /// Playlist segments are currently loaded from.
    playlist: Option<PlaylistRef>,

    /// Segment currently being loaded, if any.
    pending_segment: Option<SegmentInfo>,

    /// Requests of the `pending_segment`, while they are not all finished.
    segment_request: Option<SegmentRequest>,

    /// Index in `playlist` of the last segment pushed, from which the next segment is
    /// deduced. `None` when the next segment has to be found from a `SyncPoint`.
    media_index: Option<isize>,

    sync_point: Option<SyncPoint>,

    /// Timeline of the last segment pushed.
    current_timeline: Option<u64>,

    /// If `true`, the next segment is searched from the end of the buffer instead of from the
    /// current position.
    fetch_at_buffer: bool,

    /// If `true`, the last segment of an ended playlist has been pushed.
    ended: bool,

    paused: bool,

    /// Timer regularly started to check the buffer. Only one may be pending at a time.
    check_buffer_timer: Option<TimerId>,

    observation: MediaObservation,

    /// Initialization segments already loaded.
    init_segments: HashMap<InitSegmentId, Vec<u8>>,

    /// Decryption keys already loaded, per URI.
    keys: HashMap<String, [u8; 16]>,

    /// Initialization segment last pushed to the buffer.
    active_init_segment: Option<InitSegmentId>,

    stats: LoaderStats,

    /// Last error reported.
    error: Option<LoaderError>,

    notifier: Notifier<LoaderEvent>,

    next_request_id: u64,
}

impl<E: Environment> SegmentLoader<E> {
    /// Creates a new `SegmentLoader` relying on the given environment components.
    ///
    /// It starts paused, in the `Init` state.
    pub fn new(
        config: LoaderConfiguration,
        transport: E::Transport,
        buffer: E::Buffer,
        decrypter: E::Decrypter,
        demuxer: E::Demuxer,
        clock: E::Clock,
    ) -> Self {
        Self {
            state: LoaderState::Init,
            config,
            transport,
            decrypter,
            demuxer,
            clock,
            source_buffer: SourceBufferQueue::new(buffer),
            sync_controller: SyncController::new(),
            bandwidth_estimator: BandwidthEstimator::new(),
            rendition_selector: RenditionSelector::from_config(&SelectorConfiguration::default()),
            playlist: None,
            pending_segment: None,
            segment_request: None,
            media_index: None,
            sync_point: None,
            current_timeline: None,
            fetch_at_buffer: false,
            ended: false,
            paused: true,
            check_buffer_timer: None,
            observation: MediaObservation::default(),
            init_segments: HashMap::new(),
            keys: HashMap::new(),
            active_init_segment: None,
            stats: LoaderStats::default(),
            error: None,
            notifier: Notifier::new(),
            next_request_id: 0,
        }
    }

    /// Receive every `LoaderEvent` sent from now on.
    pub fn subscribe(&mut self) -> Receiver<LoaderEvent> {
        self.notifier.subscribe()
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    pub fn error(&self) -> Option<&LoaderError> {
        self.error.as_ref()
    }

    pub fn media_index(&self) -> Option<isize> {
        self.media_index
    }

    pub fn pending_segment(&self) -> Option<&SegmentInfo> {
        self.pending_segment.as_ref()
    }

    pub fn sync_point(&self) -> Option<&SyncPoint> {
        self.sync_point.as_ref()
    }

    pub fn current_timeline(&self) -> Option<u64> {
        self.current_timeline
    }

    pub fn playlist(&self) -> Option<&PlaylistRef> {
        self.playlist.as_ref()
    }

    pub fn sync_controller(&self) -> &SyncController {
        &self.sync_controller
    }

    pub fn config(&self) -> &LoaderConfiguration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut LoaderConfiguration {
        &mut self.config
    }

    /// Current bandwidth estimate, in bits per second.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth_estimator
            .get_estimate()
            .unwrap_or(self.config.initial_bandwidth)
    }

    pub fn transport(&self) -> &E::Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut E::Transport {
        &mut self.transport
    }

    pub fn decrypter_mut(&mut self) -> &mut E::Decrypter {
        &mut self.decrypter
    }

    pub fn demuxer_mut(&mut self) -> &mut E::Demuxer {
        &mut self.demuxer
    }

    pub fn clock(&self) -> &E::Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut E::Clock {
        &mut self.clock
    }

    pub fn source_buffer(&self) -> &SourceBufferQueue<E::Buffer> {
        &self.source_buffer
    }

    pub fn source_buffer_mut(&mut self) -> &mut SourceBufferQueue<E::Buffer> {
        &mut self.source_buffer
    }

    /// Update the playback conditions the loader bases its decisions on.
    pub fn update_observation(&mut self, observation: MediaObservation) {
        self.observation = observation;
    }

    /// Start or resume loading segments. Does nothing more if already loading.
    pub fn load(&mut self) {
        if self.state == LoaderState::Disposed {
            return;
        }
        self.paused = false;
        if !matches!(self.state, LoaderState::Waiting | LoaderState::Appending) {
            self.monitor_buffer();
        }
        let Some(playlist) = self.playlist.clone() else {
            return;
        };
        self.sync_controller.set_date_time_mapping(&playlist.borrow());
        if self.state == LoaderState::Init && self.could_begin_loading() {
            self.init();
        }
    }

    /// Stop checking the buffer. Pending requests and buffer operations still end normally.
    pub fn pause(&mut self) {
        if !self.paused {
            Logger::info("SegmentLoader: pausing");
        }
        self.paused = true;
        self.clear_check_buffer_timer();
    }

    /// Cancel the loading of the pending segment, if still being requested.
    pub fn abort(&mut self) {
        if self.state != LoaderState::Waiting {
            self.pending_segment = None;
            return;
        }
        Logger::info("SegmentLoader: aborting pending segment");
        if self.segment_request.is_some() {
            self.abort_requests();
            self.stats.media_requests += 1;
            self.stats.media_requests_aborted += 1;
        }
        self.pending_segment = None;
        self.set_state(LoaderState::Ready);
        self.monitor_buffer_if_unpaused();
    }

    /// Stop everything. The `SegmentLoader` cannot be used anymore afterwards.
    pub fn dispose(&mut self) {
        Logger::info("SegmentLoader: disposing");
        self.clear_check_buffer_timer();
        self.abort_requests();
        self.source_buffer.clear_queue();
        self.pending_segment = None;
        self.paused = true;
        self.set_state(LoaderState::Disposed);
    }

    /// Set the playlist segments are loaded from: either a refreshed version of the current
    /// one or the playlist of another rendition.
    pub fn set_playlist(&mut self, playlist: PlaylistRef) {
        if self.state == LoaderState::Disposed {
            return;
        }
        let old_playlist = self.playlist.replace(playlist.clone());
        if !self.observation.has_played {
            let mut pl = playlist.borrow_mut();
            pl.sync_info = Some(SyncInfo {
                media_sequence: pl.media_sequence,
                time: 0.,
            });
        }
        self.notifier.emit(LoaderEvent::SyncInfoUpdate);

        if self.state == LoaderState::Init && self.could_begin_loading() {
            self.init();
            return;
        }

        let old_playlist = match old_playlist {
            Some(old) if Rc::ptr_eq(&old, &playlist) => return,
            Some(old) if old.borrow().uri == playlist.borrow().uri => old,
            _ => {
                if self.media_index.is_some() {
                    Logger::info("SegmentLoader: playlist changed, resynchronizing");
                    self.resync_loader();
                }
                return;
            }
        };

        let old = old_playlist.borrow();
        let mut new = playlist.borrow_mut();
        let sequence_diff = (new.media_sequence as i64 - old.media_sequence as i64) as isize;
        Logger::lazy_debug(&|| {
            format!(
                "SegmentLoader: playlist refreshed, media sequence diff: {}",
                sequence_diff
            )
        });
        new.inherit_timings(&old);
        if let Some(media_index) = self.media_index.as_mut() {
            *media_index -= sequence_diff;
        }
        // Sync point indexes are relative to the first segment of the playlist
        if let Some(sync_point) = self.sync_point.as_mut() {
            sync_point.segment_index -= sequence_diff;
        }
        if let Some(pending) = self.pending_segment.as_mut() {
            pending.media_index -= sequence_diff;
            if let Some(segment) = pending
                .segment_index()
                .and_then(|idx| new.segments.get(idx))
            {
                pending.segment = segment.clone();
                pending.playlist = playlist.clone();
            }
        }
        self.sync_controller.save_expired_segment_info(&old, &mut new);
    }

    /// Remove buffered media data between `start` and `end`, in seconds.
    pub fn remove(&mut self, start: f64, end: f64) {
        self.source_buffer.remove_buffer(start, end);
    }

    /// Schedule an update of the content's duration, in seconds, once pending buffer
    /// operations are done.
    pub fn set_duration(&mut self, duration: f64) {
        self.source_buffer.set_duration(duration);
    }

    /// Requests started for the pending segment and not finished yet.
    pub fn has_pending_requests(&self) -> bool {
        self.segment_request.is_some()
    }

    /// Empty the buffer and restart loading from scratch.
    pub fn reset_everything(&mut self) {
        Logger::info("SegmentLoader: resetting everything");
        self.ended = false;
        self.reset_loader();
        if !self.source_buffer.buffered().is_empty() {
            self.remove(0., f64::INFINITY);
        }
        self.notifier.emit(LoaderEvent::ResetEverything);
    }

    /// Forget which segment comes next and look for it again from the current position.
    pub fn reset_loader(&mut self) {
        self.fetch_at_buffer = false;
        self.resync_loader();
    }

    /// Forget which segment comes next and look for it again from a new `SyncPoint`.
    pub fn resync_loader(&mut self) {
        self.media_index = None;
        self.sync_point = None;
        self.abort();
    }

    fn could_begin_loading(&self) -> bool {
        self.playlist.is_some() && !self.paused
    }

    fn init(&mut self) {
        Logger::info("SegmentLoader: initializing");
        self.set_state(LoaderState::Ready);
        self.reset_everything();
        self.monitor_buffer();
    }

    fn set_state(&mut self, state: LoaderState) {
        if self.state != state {
            Logger::debug(&format!(
                "SegmentLoader: state {:?} -> {:?}",
                self.state, state
            ));
            self.state = state;
            self.notifier.emit(LoaderEvent::StateChange(state));
        }
    }

    fn abort_requests(&mut self) {
        if let Some(mut request) = self.segment_request.take() {
            request.abort(&mut self.transport);
        }
    }

    fn clear_check_buffer_timer(&mut self) {
        if let Some(id) = self.check_buffer_timer.take() {
            self.clock.clear_timer(id);
        }
    }

    /// Check the buffer as soon as possible, then regularly while idle.
    fn monitor_buffer(&mut self) {
        self.clear_check_buffer_timer();
        self.check_buffer_timer = Some(self.clock.start_timer(1.));
    }

    fn monitor_buffer_if_unpaused(&mut self) {
        if !self.paused {
            self.monitor_buffer();
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }
}
