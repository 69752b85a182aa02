//! Contracts of the external components the segment loader drives.
//!
//! Each of them performs its work out-of-line and reports back by calling the corresponding
//! `on_*` method of the `SegmentLoader` (`on_request_finished`, `on_decrypted`,
//! `on_buffer_update_end`, `on_timer_ended`).

use thiserror::Error;

use crate::{playlist::ByteRange, utils::time_ranges::TimeRanges};

/// Identifier for a request performed through a `Transport`.
pub type RequestId = u32;

/// Identifier for a timer started through a `Clock`.
pub type TimerId = f64;

/// Identifier for a decryption job sent to a `Decrypter`.
pub type DecryptionId = u64;

/// Data obtained from a successful request.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedResource {
    pub data: Vec<u8>,

    /// Time, in milliseconds, between the start of the request and its end.
    pub duration_ms: f64,
}

/// Reason why a request could not be performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server answered with a non-success HTTP status, or `None` when no response was
    /// obtained at all.
    Http(Option<u32>),
    TimedOut,
}

pub type FetchResult = Result<FetchedResource, FetchFailure>;

/// Performs HTTP(S) requests.
pub trait Transport {
    /// Start fetching `url`, optionally only the given inclusive `byte_range`, failing with
    /// `FetchFailure::TimedOut` after `timeout` milliseconds.
    fn fetch(&mut self, url: &str, byte_range: Option<&ByteRange>, timeout: Option<f64>)
        -> RequestId;

    /// Cancel a pending request. No result will be reported for it afterwards.
    ///
    /// Returns `false` if no pending request had that id.
    fn abort(&mut self, request_id: RequestId) -> bool;
}

/// The buffer media data is pushed to before being decoded, such as an MSE `SourceBuffer`.
///
/// `append_buffer` and `remove` are asynchronous: the buffer reports being `updating` until
/// the operation ends, at which point `SegmentLoader::on_buffer_update_end` has to be called.
/// All other operations take effect immediately and are only called while not updating.
pub trait MediaBuffer {
    fn append_buffer(&mut self, data: &[u8]);
    fn remove(&mut self, start: f64, end: f64);
    fn set_timestamp_offset(&mut self, offset: f64);
    fn set_duration(&mut self, duration: f64);
    fn end_of_stream(&mut self);
    fn buffered(&self) -> TimeRanges;
    fn updating(&self) -> bool;
}

/// Decrypts AES-128-CBC encrypted segments.
///
/// The result is reported through `SegmentLoader::on_decrypted` with the same `id`.
pub trait Decrypter {
    fn decrypt(&mut self, id: DecryptionId, encrypted: Vec<u8>, key: [u8; 16], iv: [u8; 16]);
}

/// Start and end of a segment's media data, expressed in its own internal time base, in
/// seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentTimingInfo {
    pub start: f64,
    pub end: f64,
}

#[derive(Error, Clone, Debug, PartialEq)]
#[error("Could not probe segment: {0}")]
pub struct ProbeError(pub String);

/// Reads timing information from segment containers.
pub trait Demuxer {
    /// Returns `Ok(None)` when the segment contains no timed media data.
    fn probe(
        &mut self,
        init_segment: Option<&[u8]>,
        segment: &[u8],
    ) -> Result<Option<SegmentTimingInfo>, ProbeError>;
}

/// Source of monotonic time and of timers.
pub trait Clock {
    /// Monotonic timestamp, in milliseconds.
    fn now(&self) -> f64;

    /// `SegmentLoader::on_timer_ended` has to be called with the returned id once
    /// `duration_ms` milliseconds elapsed, unless cleared before.
    fn start_timer(&mut self, duration_ms: f64) -> TimerId;

    fn clear_timer(&mut self, id: TimerId);
}

/// Bundles the concrete types of every external component a `SegmentLoader` relies on.
pub trait Environment {
    type Transport: Transport;
    type Buffer: MediaBuffer;
    type Decrypter: Decrypter;
    type Demuxer: Demuxer;
    type Clock: Clock;
}
