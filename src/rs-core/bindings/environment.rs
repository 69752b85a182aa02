use log::{Level, Metadata, Record};

use super::{
    formatters::format_range_for_js, jsAbortRequest, jsAppendBuffer, jsClearTimer, jsDecrypt,
    jsEndOfStream, jsFetch, jsGetBuffered, jsGetTime, jsIsUpdating, jsLog, jsProbeSegment,
    jsRemoveBuffer, jsSetMediaSourceDuration, jsSetTimestampOffset, jsTimer, LogLevel,
};
use crate::{
    environment::{
        Clock, DecryptionId, Decrypter, Demuxer, Environment, MediaBuffer, ProbeError, RequestId,
        SegmentTimingInfo, TimerId, Transport,
    },
    playlist::ByteRange,
    utils::time_ranges::TimeRanges,
};

/// Environment whose every component is implemented on the JavaScript-side.
pub struct JsEnvironment;

impl Environment for JsEnvironment {
    type Transport = JsTransport;
    type Buffer = JsMediaBuffer;
    type Decrypter = JsDecrypter;
    type Demuxer = JsDemuxer;
    type Clock = JsClock;
}

pub struct JsTransport;

impl Transport for JsTransport {
    fn fetch(
        &mut self,
        url: &str,
        byte_range: Option<&ByteRange>,
        timeout: Option<f64>,
    ) -> RequestId {
        let (range_base, range_end) = format_range_for_js(byte_range);
        jsFetch(url, range_base, range_end, timeout)
    }

    fn abort(&mut self, request_id: RequestId) -> bool {
        jsAbortRequest(request_id)
    }
}

/// The MediaSource's SourceBuffer.
pub struct JsMediaBuffer;

impl MediaBuffer for JsMediaBuffer {
    fn append_buffer(&mut self, data: &[u8]) {
        jsAppendBuffer(data);
    }

    fn remove(&mut self, start: f64, end: f64) {
        jsRemoveBuffer(start, end);
    }

    fn set_timestamp_offset(&mut self, offset: f64) {
        jsSetTimestampOffset(offset);
    }

    fn set_duration(&mut self, duration: f64) {
        jsSetMediaSourceDuration(duration);
    }

    fn end_of_stream(&mut self) {
        jsEndOfStream();
    }

    fn buffered(&self) -> TimeRanges {
        TimeRanges::from_flat_list(&jsGetBuffered())
    }

    fn updating(&self) -> bool {
        jsIsUpdating()
    }
}

pub struct JsDecrypter;

impl Decrypter for JsDecrypter {
    fn decrypt(&mut self, id: DecryptionId, encrypted: Vec<u8>, key: [u8; 16], iv: [u8; 16]) {
        jsDecrypt(id, encrypted, &key, &iv);
    }
}

pub struct JsDemuxer;

impl Demuxer for JsDemuxer {
    fn probe(
        &mut self,
        init_segment: Option<&[u8]>,
        segment: &[u8],
    ) -> Result<Option<SegmentTimingInfo>, ProbeError> {
        jsProbeSegment(init_segment.map(|i| i.to_vec()), segment).into_result()
    }
}

pub struct JsClock;

impl Clock for JsClock {
    fn now(&self) -> f64 {
        jsGetTime()
    }

    fn start_timer(&mut self, duration_ms: f64) -> TimerId {
        jsTimer(duration_ms)
    }

    fn clear_timer(&mut self, id: TimerId) {
        jsClearTimer(id);
    }
}

/// Forwards every log record to the JavaScript console through `jsLog`.
pub(crate) struct JsLogger;

static JS_LOGGER: JsLogger = JsLogger;

impl JsLogger {
    /// Route every log of the crate to `jsLog`. Does nothing if a logger was already set.
    pub(crate) fn install() {
        if log::set_logger(&JS_LOGGER).is_err() {
            log::debug!("A logger was already installed");
        }
    }
}

impl log::Log for JsLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => LogLevel::Error,
            Level::Warn => LogLevel::Warn,
            Level::Info => LogLevel::Info,
            Level::Debug | Level::Trace => LogLevel::Debug,
        };
        jsLog(level, &record.args().to_string());
    }

    fn flush(&self) {}
}
