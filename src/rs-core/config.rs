const DEFAULT_GOAL_BUFFER_LENGTH: f64 = 30.;
const DEFAULT_CHECK_BUFFER_DELAY: f64 = 500.;
const DEFAULT_SEGMENT_REQUEST_TIMEOUT: f64 = 45000.;
const DEFAULT_BACK_BUFFER_LENGTH: f64 = 30.;
const DEFAULT_INITIAL_BANDWIDTH: f64 = 4_194_304.;
const DEFAULT_MINIMUM_BANDWIDTH: f64 = 1.;
const DEFAULT_RESYNC_TARGET_DURATION_FACTOR: f64 = 3.;

/// Configuration on which the `SegmentLoader` relies.
/// Can be updated at any time through the `config_mut` `SegmentLoader`'s method.
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfiguration {
    /// Amount of buffer, in seconds, ahead of the current position above which no new segment
    /// is requested.
    pub goal_buffer_length: f64,

    /// Interval, in milliseconds, at which the buffer is checked while the loader is idle.
    pub check_buffer_delay: f64,

    /// Timeout, in milliseconds, used for each request (key, initialization segment and
    /// media segment) of a segment load.
    ///
    /// If that timeout is exceeded, the corresponding request fails with a timeout.
    ///
    /// To set to `None` to disable.
    pub segment_request_timeout: Option<f64>,

    /// Data older than that many seconds behind the current position is removed from the
    /// buffer before each new segment request.
    pub back_buffer_length: f64,

    /// Bandwidth, in bits per second, reported before enough data has been loaded to
    /// produce an estimate.
    pub initial_bandwidth: f64,

    /// Bandwidth, in bits per second, the estimate is forced to after a request timed out.
    pub minimum_bandwidth: f64,

    /// When an appended segment ends more than this factor times the playlist's target
    /// duration before the current position, the loader restarts from scratch.
    pub resync_target_duration_factor: f64,
}

impl Default for LoaderConfiguration {
    fn default() -> Self {
        Self {
            goal_buffer_length: DEFAULT_GOAL_BUFFER_LENGTH,
            check_buffer_delay: DEFAULT_CHECK_BUFFER_DELAY,
            segment_request_timeout: Some(DEFAULT_SEGMENT_REQUEST_TIMEOUT),
            back_buffer_length: DEFAULT_BACK_BUFFER_LENGTH,
            initial_bandwidth: DEFAULT_INITIAL_BANDWIDTH,
            minimum_bandwidth: DEFAULT_MINIMUM_BANDWIDTH,
            resync_target_duration_factor: DEFAULT_RESYNC_TARGET_DURATION_FACTOR,
        }
    }
}

const DEFAULT_BANDWIDTH_VARIANCE: f64 = 1.2;
const DEFAULT_BLACKLIST_DURATION: f64 = 300_000.;

/// Configuration of the `RenditionSelector`.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectorConfiguration {
    /// Safety margin multiplied to each rendition's declared bandwidth before comparing it to
    /// the current estimate.
    pub bandwidth_variance: f64,

    /// Time, in milliseconds, a rendition stays excluded once blacklisted.
    pub blacklist_duration: f64,
}

impl Default for SelectorConfiguration {
    fn default() -> Self {
        Self {
            bandwidth_variance: DEFAULT_BANDWIDTH_VARIANCE,
            blacklist_duration: DEFAULT_BLACKLIST_DURATION,
        }
    }
}
