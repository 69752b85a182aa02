/// Moving average where each sample's influence decays exponentially with the weight of the
/// samples added after it.
#[derive(Clone, Debug)]
pub struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    /// `half_life` is the weight, in seconds of transfer, after which a sample counts for half.
    pub fn new(half_life: u32) -> Self {
        Self {
            alpha: 0.5f64.powf(1. / f64::from(half_life)),
            last_estimate: 0.,
            total_weight: 0.,
        }
    }

    /// Adds a new sample where `val` is the value to add and `weight` is its weight (the time
    /// the corresponding transfer took, in seconds).
    pub fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight);
        self.last_estimate = val * (1. - adj_alpha) + adj_alpha * self.last_estimate;
        self.total_weight += weight;
    }

    /// Returns `0.` if no sample has been added yet.
    pub fn get_estimate(&self) -> f64 {
        if self.total_weight == 0. {
            return 0.;
        }
        // corrects the bias toward the initial zero estimate
        self.last_estimate / (1. - self.alpha.powf(self.total_weight))
    }
}
