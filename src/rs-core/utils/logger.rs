use log::{Level, LevelFilter};

use crate::wasm_bindgen;

/// Target under which every log of this crate is emitted.
const LOG_TARGET: &str = "wasp_hls_loader";

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum LoggerLevel {
    None = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl From<LoggerLevel> for LevelFilter {
    fn from(level: LoggerLevel) -> Self {
        match level {
            LoggerLevel::None => LevelFilter::Off,
            LoggerLevel::Error => LevelFilter::Error,
            LoggerLevel::Warn => LevelFilter::Warn,
            LoggerLevel::Info => LevelFilter::Info,
            LoggerLevel::Debug => LevelFilter::Debug,
        }
    }
}

/// Logging facade used by the whole core.
///
/// Everything goes through the `log` crate, so the host decides where records end up: the
/// WebAssembly bindings install a logger forwarding them to the JavaScript console, native
/// users can plug any `log` implementation.
pub struct Logger {}

impl Logger {
    pub fn set_logger_level(new_level: LoggerLevel) {
        log::set_max_level(new_level.into());
    }

    pub fn info(text: &str) {
        log::info!(target: LOG_TARGET, "{}", text);
    }

    pub fn error(text: &str) {
        log::error!(target: LOG_TARGET, "{}", text);
    }

    pub fn warn(text: &str) {
        log::warn!(target: LOG_TARGET, "{}", text);
    }

    pub fn debug(text: &str) {
        log::debug!(target: LOG_TARGET, "{}", text);
    }

    pub fn lazy_info(func: &dyn Fn() -> String) {
        Self::lazy_log(Level::Info, func);
    }

    pub fn lazy_error(func: &dyn Fn() -> String) {
        Self::lazy_log(Level::Error, func);
    }

    pub fn lazy_warn(func: &dyn Fn() -> String) {
        Self::lazy_log(Level::Warn, func);
    }

    pub fn lazy_debug(func: &dyn Fn() -> String) {
        Self::lazy_log(Level::Debug, func);
    }

    fn lazy_log(level: Level, func: &dyn Fn() -> String) {
        if log::log_enabled!(target: LOG_TARGET, level) {
            log::log!(target: LOG_TARGET, level, "{}", func());
        }
    }
}
