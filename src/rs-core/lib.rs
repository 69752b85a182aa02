use wasm_bindgen::prelude::*;

pub mod adaptive;
mod bindings;
pub mod config;
pub mod decrypter;
pub mod environment;
pub mod events;
pub mod media_element;
pub mod playlist;
pub mod requester;
pub mod segment_loader;
pub mod sync_controller;
mod utils;

#[cfg(test)]
mod test_utils;

pub use bindings::{JsEnvironment, WaspSegmentLoader};
pub use config::LoaderConfiguration;
pub use events::{LoaderEvent, Notifier};
pub use segment_loader::{LoaderError, LoaderState, MediaObservation, SegmentLoader};
pub use utils::logger::{Logger, LoggerLevel};
pub use utils::time_ranges::TimeRanges;
