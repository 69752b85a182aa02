use super::ewma::Ewma;

const FAST_EWMA_HALF_LIFE: u32 = 2;
const SLOW_EWMA_HALF_LIFE: u32 = 10;
const MINIMUM_CHUNK_SIZE: usize = 16_000;
const MINIMUM_TOTAL_BYTES: usize = 150_000;

/// Produce bandwidth estimates, in bits per second, based on two EWMA (exponentially-weighted
/// moving average), one evolving slow and the other evolving fast.
///
/// The minimum between both is taken so a sudden fall in bandwidth has a lasting impact on
/// estimates and so that estimate is only raised once it stayed high for enough time.
///
/// After a request timed out, the estimator is forced down to a floor value until enough new
/// data has been sampled.
#[derive(Clone, Debug)]
pub struct BandwidthEstimator {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
    bytes_sampled: usize,
    floor: Option<f64>,
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl BandwidthEstimator {
    pub fn new() -> Self {
        Self {
            fast_ewma: Ewma::new(FAST_EWMA_HALF_LIFE),
            slow_ewma: Ewma::new(SLOW_EWMA_HALF_LIFE),
            bytes_sampled: 0,
            floor: None,
        }
    }

    /// Feed the `BandwidthEstimator` a new sample: `size_bytes` were received in
    /// `duration_ms` milliseconds.
    ///
    /// Samples too small to be representative are ignored.
    pub fn add_sample(&mut self, duration_ms: f64, size_bytes: usize) {
        if size_bytes < MINIMUM_CHUNK_SIZE || duration_ms <= 0. {
            return;
        }
        let bandwidth = (size_bytes as f64) * 8000. / duration_ms;
        let weight = duration_ms / 1000.;
        self.bytes_sampled += size_bytes;
        self.fast_ewma.add_sample(weight, bandwidth);
        self.slow_ewma.add_sample(weight, bandwidth);
    }

    /// Get the current estimate made by the `BandwidthEstimator`.
    ///
    /// Returns the forced floor, if one, or `None` when not enough data was sampled yet.
    pub fn get_estimate(&self) -> Option<f64> {
        if self.bytes_sampled < MINIMUM_TOTAL_BYTES {
            self.floor
        } else {
            Some(self.fast_ewma.get_estimate().min(self.slow_ewma.get_estimate()))
        }
    }

    /// Drop every sample and report `minimum` until enough new data is sampled.
    pub fn force_minimum(&mut self, minimum: f64) {
        self.reset();
        self.floor = Some(minimum);
    }

    /// Reset the `BandwidthEstimator` as if there was no sample added yet.
    pub fn reset(&mut self) {
        self.fast_ewma = Ewma::new(FAST_EWMA_HALF_LIFE);
        self.slow_ewma = Ewma::new(SLOW_EWMA_HALF_LIFE);
        self.bytes_sampled = 0;
        self.floor = None;
    }
}
