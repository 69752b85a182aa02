mod bandwidth_estimator;
mod ewma;
mod rendition_selector;

pub use bandwidth_estimator::BandwidthEstimator;
pub use rendition_selector::{Rendition, RenditionSelector, Resolution, SelectorError};
