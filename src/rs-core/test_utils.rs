//! In-memory implementations of the environment, recording every call made to them.

use std::collections::HashMap;

use crate::{
    environment::{
        Clock, DecryptionId, Decrypter, Demuxer, Environment, MediaBuffer, ProbeError, RequestId,
        SegmentTimingInfo, TimerId, Transport,
    },
    playlist::ByteRange,
    utils::time_ranges::TimeRanges,
};

pub(crate) struct TestEnvironment;

impl Environment for TestEnvironment {
    type Transport = MockTransport;
    type Buffer = MockMediaBuffer;
    type Decrypter = MockDecrypter;
    type Demuxer = MockDemuxer;
    type Clock = MockClock;
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MockRequest {
    pub id: RequestId,
    pub url: String,
    pub byte_range: Option<ByteRange>,
    pub timeout: Option<f64>,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    pub requests: Vec<MockRequest>,
    pub aborted: Vec<RequestId>,
    next_id: RequestId,
}

impl MockTransport {
    /// Requests which were not aborted.
    pub fn pending(&self) -> Vec<&MockRequest> {
        self.requests
            .iter()
            .filter(|r| !self.aborted.contains(&r.id))
            .collect()
    }

    /// Id of the last request performed for `url`.
    pub fn id_for(&self, url: &str) -> Option<RequestId> {
        self.requests.iter().rev().find(|r| r.url == url).map(|r| r.id)
    }
}

impl Transport for MockTransport {
    fn fetch(
        &mut self,
        url: &str,
        byte_range: Option<&ByteRange>,
        timeout: Option<f64>,
    ) -> RequestId {
        self.next_id += 1;
        self.requests.push(MockRequest {
            id: self.next_id,
            url: url.to_owned(),
            byte_range: byte_range.cloned(),
            timeout,
        });
        self.next_id
    }

    fn abort(&mut self, request_id: RequestId) -> bool {
        if self.requests.iter().any(|r| r.id == request_id) && !self.aborted.contains(&request_id)
        {
            self.aborted.push(request_id);
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BufferCall {
    Append(Vec<u8>),
    Remove(f64, f64),
    SetTimestampOffset(f64),
    SetDuration(f64),
    EndOfStream,
}

/// `MediaBuffer` whose asynchronous operations only end on `finish_operation`.
///
/// Its `buffered` ranges are only updated by the test.
#[derive(Default)]
pub(crate) struct MockMediaBuffer {
    pub calls: Vec<BufferCall>,
    pub buffered: TimeRanges,
    pub updating: bool,
}

impl MockMediaBuffer {
    pub fn finish_operation(&mut self) {
        self.updating = false;
    }

    pub fn appended(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BufferCall::Append(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }
}

impl MediaBuffer for MockMediaBuffer {
    fn append_buffer(&mut self, data: &[u8]) {
        self.updating = true;
        self.calls.push(BufferCall::Append(data.to_vec()));
    }

    fn remove(&mut self, start: f64, end: f64) {
        self.updating = true;
        self.calls.push(BufferCall::Remove(start, end));
    }

    fn set_timestamp_offset(&mut self, offset: f64) {
        self.calls.push(BufferCall::SetTimestampOffset(offset));
    }

    fn set_duration(&mut self, duration: f64) {
        self.calls.push(BufferCall::SetDuration(duration));
    }

    fn end_of_stream(&mut self) {
        self.calls.push(BufferCall::EndOfStream);
    }

    fn buffered(&self) -> TimeRanges {
        self.buffered.clone()
    }

    fn updating(&self) -> bool {
        self.updating
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DecryptionJob {
    pub id: DecryptionId,
    pub data: Vec<u8>,
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

#[derive(Default)]
pub(crate) struct MockDecrypter {
    pub jobs: Vec<DecryptionJob>,
}

impl Decrypter for MockDecrypter {
    fn decrypt(&mut self, id: DecryptionId, encrypted: Vec<u8>, key: [u8; 16], iv: [u8; 16]) {
        self.jobs.push(DecryptionJob {
            id,
            data: encrypted,
            key,
            iv,
        });
    }
}

/// `Demuxer` answering with the timings registered for a segment's exact content, and with
/// no timing information for anything else.
#[derive(Default)]
pub(crate) struct MockDemuxer {
    pub timings: HashMap<Vec<u8>, Result<SegmentTimingInfo, ProbeError>>,
    pub probed: Vec<(Option<Vec<u8>>, Vec<u8>)>,
}

impl MockDemuxer {
    pub fn set_timings(&mut self, segment: &[u8], start: f64, end: f64) {
        self.timings
            .insert(segment.to_vec(), Ok(SegmentTimingInfo { start, end }));
    }
}

impl Demuxer for MockDemuxer {
    fn probe(
        &mut self,
        init_segment: Option<&[u8]>,
        segment: &[u8],
    ) -> Result<Option<SegmentTimingInfo>, ProbeError> {
        self.probed
            .push((init_segment.map(|i| i.to_vec()), segment.to_vec()));
        match self.timings.get(segment) {
            Some(Ok(timing)) => Ok(Some(*timing)),
            Some(Err(err)) => Err(err.clone()),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub(crate) struct MockClock {
    pub now: f64,

    /// Pending timers, with their duration.
    pub timers: Vec<(TimerId, f64)>,
    next_id: TimerId,
}

impl Clock for MockClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn start_timer(&mut self, duration_ms: f64) -> TimerId {
        self.next_id += 1.;
        self.timers.push((self.next_id, duration_ms));
        self.next_id
    }

    fn clear_timer(&mut self, id: TimerId) {
        self.timers.retain(|(timer_id, _)| *timer_id != id);
    }
}
