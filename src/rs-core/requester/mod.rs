use std::fmt;

use thiserror::Error;

use crate::{
    environment::{FetchFailure, FetchResult, RequestId, Transport},
    playlist::Segment,
    Logger,
};

/// Size, in bytes, of an AES-128 key.
const KEY_LENGTH: usize = 16;

/// Category of a failed segment load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// The server answered with an error HTTP status or could not be reached.
    NetworkFailure,
    Timeout,

    /// The request was cancelled because another one failed.
    Aborted,

    /// The segment was loaded but contained no data.
    EmptyContent,

    /// The decryption key loaded does not have the expected size.
    InvalidKey,
}

impl RequestErrorKind {
    /// Rank used to report the root cause of a failure: real failures first, then
    /// timeouts, then the aborts they triggered.
    pub fn severity(&self) -> u8 {
        match self {
            RequestErrorKind::NetworkFailure
            | RequestErrorKind::EmptyContent
            | RequestErrorKind::InvalidKey => 2,
            RequestErrorKind::Timeout => 1,
            RequestErrorKind::Aborted => 0,
        }
    }
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RequestErrorKind::NetworkFailure => "network failure",
            RequestErrorKind::Timeout => "timeout",
            RequestErrorKind::Aborted => "aborted",
            RequestErrorKind::EmptyContent => "empty content",
            RequestErrorKind::InvalidKey => "invalid key",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
#[error("Request {kind} for {url}")]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub url: String,

    /// HTTP status received, if any.
    pub status: Option<u32>,
}

/// What a request of a `SegmentRequest` is loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LegType {
    Key,
    InitSegment,
    Segment,
}

#[derive(Debug)]
struct Leg {
    leg_type: LegType,
    request_id: RequestId,
    url: String,
    done: bool,
}

/// Transfer metrics of the media segment's request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestStats {
    pub bytes_received: usize,

    /// Time the request took, in milliseconds.
    pub round_trip_time: f64,

    /// Resulting bandwidth, in bits per second.
    pub bandwidth: f64,
}

/// Everything loaded for a segment.
#[derive(Debug, PartialEq)]
pub(crate) struct LoadedSegment {
    /// Present only if the key had to be loaded.
    pub key: Option<[u8; 16]>,

    /// Present only if the initialization segment had to be loaded.
    pub init_segment: Option<Vec<u8>>,

    pub data: Vec<u8>,
    pub stats: RequestStats,
}

/// The concurrent requests needed to load a segment: its decryption key and initialization
/// segment when not already known, and the segment itself.
///
/// A result is only produced once every request has ended. If one of them fails, all others
/// are aborted and the most severe error is reported.
#[derive(Debug)]
pub(crate) struct SegmentRequest {
    legs: Vec<Leg>,
    errors: Vec<RequestError>,
    key: Option<[u8; 16]>,
    init_segment: Option<Vec<u8>>,
    data: Option<(Vec<u8>, f64)>,
}

impl SegmentRequest {
    /// Start all requests needed to load `segment`.
    ///
    /// # Arguments
    ///
    /// * `transport` - Used to perform the requests.
    ///
    /// * `segment` - The segment to load.
    ///
    /// * `load_key` - If `true` and the segment is encrypted, its key is also loaded.
    ///
    /// * `load_init_segment` - If `true` and the segment has an initialization segment, it is
    ///   also loaded.
    ///
    /// * `timeout` - Timeout, in milliseconds, of each request.
    pub(crate) fn start<T: Transport>(
        transport: &mut T,
        segment: &Segment,
        load_key: bool,
        load_init_segment: bool,
        timeout: Option<f64>,
    ) -> Self {
        let mut legs = Vec::with_capacity(3);
        if let Some(key) = segment.key.as_ref().filter(|_| load_key) {
            legs.push(Leg {
                leg_type: LegType::Key,
                request_id: transport.fetch(&key.uri, None, timeout),
                url: key.uri.clone(),
                done: false,
            });
        }
        if let Some(map) = segment.map.as_ref().filter(|_| load_init_segment) {
            legs.push(Leg {
                leg_type: LegType::InitSegment,
                request_id: transport.fetch(&map.uri, map.byte_range.as_ref(), timeout),
                url: map.uri.clone(),
                done: false,
            });
        }
        legs.push(Leg {
            leg_type: LegType::Segment,
            request_id: transport.fetch(&segment.uri, segment.byte_range.as_ref(), timeout),
            url: segment.uri.clone(),
            done: false,
        });
        Logger::lazy_debug(&|| {
            format!(
                "Requester: loading {} in {} request(s)",
                segment.uri,
                legs.len()
            )
        });
        Self {
            legs,
            errors: vec![],
            key: None,
            init_segment: None,
            data: None,
        }
    }

    /// Returns `true` if the request with that id is a pending part of that
    /// `SegmentRequest`.
    pub(crate) fn is_pending(&self, request_id: RequestId) -> bool {
        self.legs
            .iter()
            .any(|l| l.request_id == request_id && !l.done)
    }

    /// To call once one of the requests ended.
    ///
    /// Returns `Some` once every request ended, with either the loaded data or the most
    /// severe error encountered.
    pub(crate) fn on_request_finished<T: Transport>(
        &mut self,
        transport: &mut T,
        request_id: RequestId,
        result: FetchResult,
    ) -> Option<Result<LoadedSegment, RequestError>> {
        let leg_idx = self
            .legs
            .iter()
            .position(|l| l.request_id == request_id && !l.done)?;
        self.legs[leg_idx].done = true;
        let leg_type = self.legs[leg_idx].leg_type;
        let url = self.legs[leg_idx].url.clone();

        let failure = match result {
            Err(FetchFailure::TimedOut) => Some(RequestError {
                kind: RequestErrorKind::Timeout,
                url,
                status: None,
            }),
            Err(FetchFailure::Http(status)) => Some(RequestError {
                kind: RequestErrorKind::NetworkFailure,
                url,
                status,
            }),
            Ok(resource) => self.store(leg_type, url, resource.data, resource.duration_ms),
        };
        if let Some(error) = failure {
            Logger::warn(&format!("Requester: {}", error));
            self.errors.push(error);
            self.abort_pending(transport);
        }
        self.result()
    }

    /// Cancel every pending request. No result will be produced anymore.
    pub(crate) fn abort<T: Transport>(&mut self, transport: &mut T) {
        self.abort_pending(transport);
    }

    fn store(
        &mut self,
        leg_type: LegType,
        url: String,
        data: Vec<u8>,
        duration_ms: f64,
    ) -> Option<RequestError> {
        match leg_type {
            LegType::Key => match <[u8; KEY_LENGTH]>::try_from(data.as_slice()) {
                Ok(key) => self.key = Some(key),
                Err(_) => {
                    return Some(RequestError {
                        kind: RequestErrorKind::InvalidKey,
                        url,
                        status: None,
                    })
                }
            },
            LegType::InitSegment => self.init_segment = Some(data),
            LegType::Segment => {
                if data.is_empty() {
                    return Some(RequestError {
                        kind: RequestErrorKind::EmptyContent,
                        url,
                        status: None,
                    });
                }
                self.data = Some((data, duration_ms));
            }
        }
        None
    }

    /// Aborted requests end immediately, they are recorded as such.
    fn abort_pending<T: Transport>(&mut self, transport: &mut T) {
        for leg in self.legs.iter_mut().filter(|l| !l.done) {
            Logger::debug(&format!("Requester: aborting request for {}", leg.url));
            transport.abort(leg.request_id);
            leg.done = true;
            self.errors.push(RequestError {
                kind: RequestErrorKind::Aborted,
                url: leg.url.clone(),
                status: None,
            });
        }
    }

    fn result(&mut self) -> Option<Result<LoadedSegment, RequestError>> {
        if self.legs.iter().any(|l| !l.done) {
            return None;
        }
        let mut worst: Option<RequestError> = None;
        for error in self.errors.drain(..) {
            if worst
                .as_ref()
                .map_or(true, |w| error.kind.severity() > w.kind.severity())
            {
                worst = Some(error);
            }
        }
        if let Some(error) = worst {
            return Some(Err(error));
        }
        let (data, round_trip_time) = self.data.take()?;
        let bytes_received = data.len();
        let bandwidth = if round_trip_time > 0. {
            (bytes_received as f64 * 8000. / round_trip_time).floor()
        } else {
            f64::MAX
        };
        Some(Ok(LoadedSegment {
            key: self.key.take(),
            init_segment: self.init_segment.take(),
            data,
            stats: RequestStats {
                bytes_received,
                round_trip_time,
                bandwidth,
            },
        }))
    }
}
