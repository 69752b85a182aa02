use crate::{
    environment::{DecryptionId, ProbeError, RequestId, SegmentTimingInfo, TimerId},
    wasm_bindgen,
};

/// # js_functions
///
/// JavaScript functions the segment loader relies on, with the types they exchange.

#[wasm_bindgen]
extern "C" {
    // Output `log` to the JavaScript console at the given level.
    pub fn jsLog(log_level: LogLevel, log: &str);

    // Start a `duration` milliseconds timer. When it fires, `on_timer_ended` of the
    // `WaspSegmentLoader` is called with the returned `TimerId`, unless it was cancelled
    // through `jsClearTimer` in the meantime.
    pub fn jsTimer(duration: f64) -> TimerId;

    // Cancel a timer started through `jsTimer`.
    pub fn jsClearTimer(id: TimerId);

    // Monotonic timestamp, in milliseconds, such as `performance.now()`.
    pub fn jsGetTime() -> f64;

    // Fetch the given `url` from the network, optionally only the inclusive byte range
    // `range_base`-`range_end`, and await a response.
    //
    // The outcome is reported later, never synchronously, through the `on_request_finished`
    // or `on_request_failed` method of the `WaspSegmentLoader`. Requests cancelled through
    // `jsAbortRequest` report nothing.
    pub fn jsFetch(
        url: &str,
        range_base: Option<usize>,
        range_end: Option<usize>,
        timeout: Option<f64>,
    ) -> RequestId;

    // Cancel the pending `jsFetch` request with that id. Returns `false` when no such request
    // was pending.
    pub fn jsAbortRequest(request_id: RequestId) -> bool;

    // Append media data to the SourceBuffer.
    //
    // This process is asynchronous: the `on_source_buffer_update` method of the
    // `WaspSegmentLoader` has to be called once the SourceBuffer emits `updateend`.
    pub fn jsAppendBuffer(data: &[u8]);

    // Remove media data between `start` and `end`, in seconds, from the SourceBuffer.
    //
    // As for `jsAppendBuffer`, `on_source_buffer_update` has to be called once done.
    pub fn jsRemoveBuffer(start: f64, end: f64);

    pub fn jsSetTimestampOffset(offset: f64);

    // Update the duration in seconds of the MediaSource.
    pub fn jsSetMediaSourceDuration(duration: f64);

    // Call the `MediaSource.prototype.endOfStream` API.
    pub fn jsEndOfStream();

    // Get the content of what has been buffered by the SourceBuffer, in terms of contiguous
    // time ranges, in seconds.
    // The returned vector has an even length: each couple of f64 gives the start and the
    // end of a range.
    pub fn jsGetBuffered() -> Vec<f64>;

    // Returns the `updating` attribute of the SourceBuffer.
    pub fn jsIsUpdating() -> bool;

    // Decrypt AES-128-CBC encrypted data, for example through the WebCrypto API.
    //
    // The result has to be communicated through the `on_decrypted` method of the
    // `WaspSegmentLoader`, with the same `id`.
    pub fn jsDecrypt(id: DecryptionId, data: Vec<u8>, key: &[u8], iv: &[u8]);

    // Read the start and end times of the given media segment, expressed in its own
    // internal time base.
    pub fn jsProbeSegment(init_segment: Option<Vec<u8>>, segment: &[u8]) -> ProbeResult;

    // Announce that the segment loader went into another state.
    pub fn jsAnnounceStateChange(state: SegmentLoaderState);

    // Announce an event of the segment loader.
    //
    // `value` and `other_value` depend on the type of event:
    //   - `TimestampOffset`: `value` is the new offset, in seconds.
    //   - `SegmentTimeMapping`: `value` is the timeline and `other_value` its mapping, in
    //     seconds.
    pub fn jsAnnounceLoaderEvent(
        event: LoaderEventType,
        value: Option<f64>,
        other_value: Option<f64>,
    );

    // Announce that an error prevents the segment loader from going further. Loading is
    // paused until `load` is called again.
    pub fn jsSendLoaderError(
        code: LoaderErrorCode,
        url: &str,
        status: Option<u32>,
        message: &str,
    );

    // Announce that segments should now be loaded from the rendition with the given
    // playlist URI.
    pub fn jsAnnounceRenditionSwitch(uri: &str);

    // Announce that a playlist given to `set_playlist_json`, or a list of renditions given
    // to `set_renditions_json`, could not be parsed.
    pub fn jsSendPlaylistParsingError(message: &str);
}

/// Severity given to `jsLog`.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentLoaderState {
    Init = 0,
    Ready = 1,
    Waiting = 2,
    Appending = 3,
    Disposed = 4,
}

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderEventType {
    Progress = 0,
    SyncInfoUpdate = 1,
    BandwidthUpdate = 2,
    TimestampOffset = 3,
    SegmentTimeMapping = 4,
    ResetEverything = 5,
    Ended = 6,
}

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderErrorCode {
    NetworkFailure = 0,
    Timeout = 1,
    Aborted = 2,
    EmptyContent = 3,
    InvalidKey = 4,
    FatalDecodeError = 5,
    NoAlternativeRendition = 6,
}

/// Result of calling the `jsProbeSegment` JavaScript function.
///
/// Creation of a `ProbeResult` should only be performed by the JavaScript side through the
/// exposed static constructors.
#[wasm_bindgen]
pub struct ProbeResult {
    result: Result<Option<SegmentTimingInfo>, String>,
}

#[wasm_bindgen]
impl ProbeResult {
    /// Creates a `ProbeResult` with the start and end, in seconds, of the probed segment.
    ///
    /// This function should only be called by the JavaScript-side.
    pub fn timing(start: f64, end: f64) -> Self {
        Self {
            result: Ok(Some(SegmentTimingInfo { start, end })),
        }
    }

    /// Creates a `ProbeResult` for a segment without any timed media data.
    ///
    /// This function should only be called by the JavaScript-side.
    pub fn no_timing() -> Self {
        Self { result: Ok(None) }
    }

    /// Creates a `ProbeResult` indicating that the segment could not be parsed.
    ///
    /// This function should only be called by the JavaScript-side.
    pub fn error(message: String) -> Self {
        Self {
            result: Err(message),
        }
    }
}

impl ProbeResult {
    pub(crate) fn into_result(self) -> Result<Option<SegmentTimingInfo>, ProbeError> {
        self.result.map_err(ProbeError)
    }
}
