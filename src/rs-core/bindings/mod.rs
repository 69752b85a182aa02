mod environment;
mod formatters;
mod js_functions;
mod segment_loader;

pub use environment::JsEnvironment;
pub use js_functions::*;
pub use segment_loader::WaspSegmentLoader;
