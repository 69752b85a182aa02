/// Cumulative moving average of the rate at which loaded data is processed, from the end of
/// its requests to the end of its push to the buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Throughput {
    /// In bits per second.
    pub rate: f64,
    pub count: u32,
}

impl Throughput {
    pub(crate) fn add_sample(&mut self, rate: f64) {
        self.count += 1;
        self.rate += (rate - self.rate) / f64::from(self.count);
    }
}

/// Metrics gathered by a `SegmentLoader` since its creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoaderStats {
    /// Every segment load started, whatever its outcome.
    pub media_requests: u32,
    pub media_requests_aborted: u32,
    pub media_requests_timedout: u32,
    pub media_requests_errored: u32,

    /// Time, in milliseconds, spent loading media segments.
    pub media_transfer_duration: f64,
    pub media_bytes_transferred: usize,

    /// Seconds of media pushed to the buffer.
    pub media_seconds_loaded: f64,

    pub throughput: Throughput,

    /// Bandwidth, in bits per second, measured on the last media segment's request.
    pub bandwidth: Option<f64>,

    /// Time, in milliseconds, the last media segment's request took. `None` after a timeout.
    pub round_trip: Option<f64>,
}
