use std::sync::mpsc::Receiver;

use super::{
    environment::{
        JsClock, JsDecrypter, JsDemuxer, JsEnvironment, JsLogger, JsMediaBuffer, JsTransport,
    },
    formatters::{format_event_for_js, format_loader_error_for_js, format_state_for_js},
    jsAnnounceLoaderEvent, jsAnnounceRenditionSwitch, jsAnnounceStateChange, jsSendLoaderError,
    jsSendPlaylistParsingError,
};
use crate::{
    adaptive::{Rendition, Resolution},
    config::LoaderConfiguration,
    decrypter::DecryptionError,
    environment::{DecryptionId, FetchFailure, FetchedResource, RequestId, TimerId},
    events::LoaderEvent,
    playlist::Playlist,
    segment_loader::{MediaObservation, SegmentLoader},
    utils::logger::LoggerLevel,
    wasm_bindgen, Logger,
};

/// `SegmentLoader` driven by the JavaScript-side.
///
/// Every event of the loader is forwarded to JavaScript once the method which triggered it
/// returns.
#[wasm_bindgen]
pub struct WaspSegmentLoader {
    loader: SegmentLoader<JsEnvironment>,
    events: Receiver<LoaderEvent>,
}

#[wasm_bindgen]
impl WaspSegmentLoader {
    /// Create a new `WaspSegmentLoader`, paused until `load` is called.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        JsLogger::install();
        let mut loader = SegmentLoader::new(
            LoaderConfiguration::default(),
            JsTransport,
            JsMediaBuffer,
            JsDecrypter,
            JsDemuxer,
            JsClock,
        );
        let events = loader.subscribe();
        Self { loader, events }
    }

    pub fn set_logger_level(&self, level: LoggerLevel) {
        Logger::set_logger_level(level);
    }

    pub fn set_buffer_goal(&mut self, buffer_goal: f64) {
        self.loader.config_mut().goal_buffer_length = buffer_goal;
    }

    pub fn set_segment_request_timeout(&mut self, timeout: Option<f64>) {
        self.loader.config_mut().segment_request_timeout = timeout;
    }

    pub fn set_back_buffer_length(&mut self, length: f64) {
        self.loader.config_mut().back_buffer_length = length;
    }

    /// Current bandwidth estimate, in bits per second.
    pub fn bandwidth(&self) -> f64 {
        self.loader.bandwidth()
    }

    pub fn load(&mut self) {
        self.loader.load();
        self.forward_events();
    }

    pub fn pause(&mut self) {
        self.loader.pause();
        self.forward_events();
    }

    pub fn abort(&mut self) {
        self.loader.abort();
        self.forward_events();
    }

    pub fn dispose(&mut self) {
        self.loader.dispose();
        self.forward_events();
    }

    pub fn remove(&mut self, start: f64, end: f64) {
        self.loader.remove(start, end);
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.loader.set_duration(duration);
    }

    pub fn reset_everything(&mut self) {
        self.loader.reset_everything();
        self.forward_events();
    }

    /// Communicate the playlist to load segments from, as a JSON description, either a
    /// refreshed version of the current one or the playlist of another rendition.
    pub fn set_playlist_json(&mut self, json: &str) {
        match Playlist::from_json(json) {
            Ok(playlist) => {
                self.loader.set_playlist(playlist.into_ref());
                self.forward_events();
            }
            Err(err) => {
                Logger::error(&format!("Bindings: invalid playlist: {}", err));
                jsSendPlaylistParsingError(&err.to_string());
            }
        }
    }

    /// Communicate the renditions the content is available in, as a JSON array of
    /// `{ uri, bandwidth?, resolution?: { width, height } }` objects.
    ///
    /// Once set, the loader announces through `jsAnnounceRenditionSwitch` when another
    /// rendition should be loaded.
    pub fn set_renditions_json(&mut self, json: &str) {
        match Rendition::list_from_json(json) {
            Ok(renditions) => self.loader.set_renditions(renditions),
            Err(err) => {
                Logger::error(&format!("Bindings: invalid renditions: {}", err));
                jsSendPlaylistParsingError(&err.to_string());
            }
        }
    }

    /// Size, in pixels, of the area the content is displayed in. Both dimensions should be
    /// set for it to be considered.
    pub fn set_viewport(&mut self, width: Option<u32>, height: Option<u32>) {
        let viewport = match (width, height) {
            (Some(width), Some(height)) => Some(Resolution::new(width, height)),
            _ => None,
        };
        self.loader.set_viewport(viewport);
    }

    /// Playlist URI of the rendition to load for the current bandwidth estimate.
    pub fn select_rendition(&mut self) -> Option<String> {
        self.loader.select_rendition().map(|r| r.uri.clone())
    }

    /// Exclude the rendition with the given playlist URI from the choice for `duration`
    /// milliseconds, or for a default duration if not set.
    ///
    /// Returns the playlist URI of the rendition to load instead, if any.
    pub fn blacklist_rendition(&mut self, uri: &str, duration: Option<f64>) -> Option<String> {
        let fallback = self
            .loader
            .blacklist_rendition(uri, duration)
            .map(|r| r.uri);
        self.forward_events();
        fallback
    }

    /// The JS code should call this method regularly and each time playback conditions
    /// changed.
    ///
    /// # Arguments
    ///
    /// * `current_time` - The current playback position, in seconds.
    ///
    /// * `has_played` - `true` if playback already started at least once.
    ///
    /// * `seeking` - The `seeking` attribute of the media element.
    ///
    /// * `seekable_start` - Start of the media element's first `seekable` range, if any.
    pub fn on_playback_observation(
        &mut self,
        current_time: f64,
        has_played: bool,
        seeking: bool,
        seekable_start: Option<f64>,
    ) {
        self.loader.update_observation(MediaObservation {
            current_time,
            has_played,
            seeking,
            seekable_start,
        });
    }

    /// The JS code should call this method each time an HTTP(S) request started with
    /// `jsFetch` finished with success.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier given by `jsFetch` when the request was started.
    ///
    /// * `data` - The loaded resource.
    ///
    /// * `duration_ms` - Number of milliseconds taken to perform the request from start to
    ///   finish.
    pub fn on_request_finished(&mut self, request_id: RequestId, data: Vec<u8>, duration_ms: f64) {
        self.loader
            .on_request_finished(request_id, Ok(FetchedResource { data, duration_ms }));
        self.forward_events();
    }

    /// The JS code should call this method each time an HTTP(S) request started with
    /// `jsFetch` finished with an error.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier given by `jsFetch` when the request was started.
    ///
    /// * `has_timeouted` - If `true`, the issue was due to the request timeouting.
    ///
    /// * `status` - If set, the issue was due to a non-satisfying HTTP status being
    ///   received.
    pub fn on_request_failed(
        &mut self,
        request_id: RequestId,
        has_timeouted: bool,
        status: Option<u32>,
    ) {
        let failure = if has_timeouted {
            FetchFailure::TimedOut
        } else {
            FetchFailure::Http(status)
        };
        self.loader.on_request_finished(request_id, Err(failure));
        self.forward_events();
    }

    /// The JS code should call this method once a decryption started with `jsDecrypt` ended,
    /// with `None` if it failed.
    pub fn on_decrypted(&mut self, id: DecryptionId, data: Option<Vec<u8>>) {
        // WebCrypto only reports wrong keys or IVs through invalid padding
        let result = data.ok_or(DecryptionError::Padding);
        self.loader.on_decrypted(id, result);
        self.forward_events();
    }

    /// The JS code should call this method when the SourceBuffer emits an `updateend`
    /// event.
    pub fn on_source_buffer_update(&mut self) {
        self.loader.on_buffer_update_end();
        self.forward_events();
    }

    /// The JS code should call this method once a timer started with `jsTimer` ended.
    pub fn on_timer_ended(&mut self, id: TimerId) {
        self.loader.on_timer_ended(id);
        self.forward_events();
    }
}

impl WaspSegmentLoader {
    fn forward_events(&self) {
        for event in self.events.try_iter() {
            match event {
                LoaderEvent::StateChange(state) => jsAnnounceStateChange(format_state_for_js(state)),
                LoaderEvent::Error(err) => {
                    let (code, url, status) = format_loader_error_for_js(&err);
                    jsSendLoaderError(code, url, status, &err.to_string());
                }
                LoaderEvent::RenditionSwitch(uri) => jsAnnounceRenditionSwitch(&uri),
                other => {
                    if let Some((event_type, value, other_value)) = format_event_for_js(&other) {
                        jsAnnounceLoaderEvent(event_type, value, other_value);
                    }
                }
            }
        }
    }
}

impl Default for WaspSegmentLoader {
    fn default() -> Self {
        Self::new()
    }
}
