use std::{rc::Rc, sync::mpsc::Receiver};

use super::*;
use crate::{
    adaptive::Rendition,
    config::LoaderConfiguration,
    environment::{FetchFailure, FetchedResource, ProbeError},
    playlist::{ByteRange, KeyInfo, MapInfo, Playlist, Segment},
    sync_controller::SyncStrategy,
    test_utils::{
        BufferCall, DecryptionJob, MockClock, MockDecrypter, MockDemuxer, MockMediaBuffer,
        MockTransport, TestEnvironment,
    },
    utils::time_ranges::TimeRanges,
};

type TestLoader = SegmentLoader<TestEnvironment>;

fn new_loader() -> TestLoader {
    SegmentLoader::new(
        LoaderConfiguration::default(),
        MockTransport::default(),
        MockMediaBuffer::default(),
        MockDecrypter::default(),
        MockDemuxer::default(),
        MockClock::default(),
    )
}

fn playlist(uri: &str, media_sequence: u64, count: usize, end_list: bool) -> PlaylistRef {
    let prefix = uri.trim_end_matches(".m3u8");
    let segments = (0..count)
        .map(|idx| Segment::new(&format!("{}{}.ts", prefix, media_sequence + idx as u64), 10.))
        .collect();
    Playlist::new(uri, media_sequence, 0, 10., segments, end_list).into_ref()
}

fn fire_timer(loader: &mut TestLoader) {
    let (id, _) = loader.clock_mut().timers.pop().unwrap();
    loader.on_timer_ended(id);
}

fn answer(loader: &mut TestLoader, url: &str, data: &[u8]) {
    let id = loader.transport().id_for(url).unwrap();
    loader.on_request_finished(
        id,
        Ok(FetchedResource {
            data: data.to_vec(),
            duration_ms: 100.,
        }),
    );
}

fn finish_buffer_operation(loader: &mut TestLoader) {
    loader.source_buffer_mut().buffer_mut().finish_operation();
    loader.on_buffer_update_end();
}

fn requested_urls(loader: &TestLoader) -> Vec<String> {
    loader
        .transport()
        .requests
        .iter()
        .map(|r| r.url.clone())
        .collect()
}

fn events(receiver: &Receiver<LoaderEvent>) -> Vec<LoaderEvent> {
    receiver.try_iter().collect()
}

fn played_at(current_time: f64) -> MediaObservation {
    MediaObservation {
        current_time,
        has_played: true,
        ..MediaObservation::default()
    }
}

/// Loader loading the given playlist, its first buffer check already triggered.
fn started_loader(playlist: &PlaylistRef) -> TestLoader {
    let mut loader = new_loader();
    loader.set_playlist(playlist.clone());
    loader.load();
    fire_timer(&mut loader);
    loader
}

#[test]
fn test_load_twice_keeps_one_request() {
    let mut loader = new_loader();
    loader.set_playlist(playlist("media.m3u8", 0, 4, true));
    assert_eq!(loader.state(), LoaderState::Init);
    loader.load();
    loader.load();
    assert_eq!(loader.state(), LoaderState::Ready);
    assert_eq!(loader.clock().timers.len(), 1);

    fire_timer(&mut loader);
    assert_eq!(loader.state(), LoaderState::Waiting);
    loader.load();
    loader.load();
    assert_eq!(requested_urls(&loader), vec!["media0.ts"]);
    assert!(loader.clock().timers.is_empty());
}

#[test]
fn test_nothing_happens_without_load() {
    let mut loader = new_loader();
    loader.set_playlist(playlist("media.m3u8", 0, 4, true));
    assert_eq!(loader.state(), LoaderState::Init);
    assert!(loader.paused());
    assert!(loader.clock().timers.is_empty());
}

#[test]
fn test_check_buffer_respects_goal() {
    let mut loader = new_loader();
    loader.config_mut().goal_buffer_length = 120.;
    let pl = playlist("media.m3u8", 0, 20, true);
    let sync_point = Some(SyncPoint {
        time: 0.,
        segment_index: 0,
        strategy: SyncStrategy::Vod,
    });
    let full = TimeRanges::from_flat_list(&[0., 130.]);
    assert!(loader
        .check_buffer(&full, &pl, Some(12), true, 0., sync_point)
        .is_none());

    let partial = TimeRanges::from_flat_list(&[0., 100.]);
    let info = loader
        .check_buffer(&partial, &pl, None, true, 0., sync_point)
        .unwrap();
    assert_eq!(info.media_index(), 0);

    // before playback, one second of media is enough
    let small = TimeRanges::from_flat_list(&[0., 1.5]);
    assert!(loader
        .check_buffer(&small, &pl, None, false, 0., sync_point)
        .is_none());
}

#[test]
fn test_check_buffer_on_fresh_vod() {
    let loader = new_loader();
    let pl = playlist("media.m3u8", 0, 4, true);
    let sync_point = Some(SyncPoint {
        time: 0.,
        segment_index: 0,
        strategy: SyncStrategy::Vod,
    });
    let info = loader
        .check_buffer(&TimeRanges::new(), &pl, None, false, 0., sync_point)
        .unwrap();
    assert_eq!(info.media_index(), 0);
    assert_eq!(info.start_of_segment(), Some(0.));
    assert_eq!(info.timestamp_offset(), None);
    assert!(!info.is_sync_request());
}

#[test]
fn test_check_buffer_without_sync_point() {
    let loader = new_loader();
    let pl = playlist("media.m3u8", 0, 4, false);
    let info = loader
        .check_buffer(&TimeRanges::new(), &pl, None, true, 0., None)
        .unwrap();
    assert!(info.is_sync_request());
    assert_eq!(info.media_index(), 0);
    assert_eq!(info.start_of_segment(), None);

    let empty = Playlist::new("empty.m3u8", 0, 0, 10., vec![], false).into_ref();
    assert!(loader
        .check_buffer(&TimeRanges::new(), &empty, None, true, 0., None)
        .is_none());
}

#[test]
fn test_check_buffer_continues_after_last_segment() {
    let loader = new_loader();
    let pl = playlist("media.m3u8", 0, 4, true);
    pl.borrow_mut().segments[1].end = Some(20.5);
    let sync_point = Some(SyncPoint {
        time: 0.,
        segment_index: 0,
        strategy: SyncStrategy::Vod,
    });
    let buffered = TimeRanges::from_flat_list(&[0., 19.]);
    let info = loader
        .check_buffer(&buffered, &pl, Some(1), true, 0., sync_point)
        .unwrap();
    assert_eq!(info.media_index(), 2);
    assert_eq!(info.start_of_segment(), Some(20.5));

    let info = loader
        .check_buffer(&buffered, &pl, Some(2), true, 0., sync_point)
        .unwrap();
    assert_eq!(info.start_of_segment(), Some(19.));

    assert!(loader
        .check_buffer(&buffered, &pl, Some(3), true, 0., sync_point)
        .is_none());
}

#[test]
fn test_vod_segments_are_loaded_and_pushed_in_order() {
    let pl = playlist("media.m3u8", 0, 2, true);
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.set_playlist(pl.clone());
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media0.ts"]);
    assert_eq!(loader.pending_segment().unwrap().timestamp_offset(), Some(0.));

    answer(&mut loader, "media0.ts", &[1]);
    assert_eq!(loader.state(), LoaderState::Appending);
    assert_eq!(loader.source_buffer().buffer().appended(), vec![&[1u8][..]]);
    assert_eq!(pl.borrow().segments[0].start, Some(0.));
    assert_eq!(pl.borrow().segments[0].end, Some(10.));

    finish_buffer_operation(&mut loader);
    assert_eq!(loader.state(), LoaderState::Ready);
    assert_eq!(loader.media_index(), Some(0));
    assert_eq!(loader.current_timeline(), Some(0));
    assert_eq!(loader.stats().media_requests, 1);
    assert_eq!(loader.stats().media_seconds_loaded, 10.);
    let first_events = events(&receiver);
    assert!(first_events.contains(&LoaderEvent::Progress));
    assert!(first_events.contains(&LoaderEvent::SegmentTimeMapping {
        timeline: 0,
        mapping: 0.
    }));
    assert!(!first_events.contains(&LoaderEvent::BandwidthUpdate));

    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media0.ts", "media1.ts"]);
    assert_eq!(loader.pending_segment().unwrap().start_of_segment(), Some(10.));
    assert_eq!(loader.pending_segment().unwrap().timestamp_offset(), None);

    answer(&mut loader, "media1.ts", &[2]);
    finish_buffer_operation(&mut loader);
    let second_events = events(&receiver);
    assert!(second_events.contains(&LoaderEvent::BandwidthUpdate));
    assert!(second_events.contains(&LoaderEvent::Ended));
    assert_eq!(
        loader.source_buffer().buffer().calls.last(),
        Some(&BufferCall::EndOfStream)
    );

    // nothing left to load
    fire_timer(&mut loader);
    assert_eq!(loader.transport().requests.len(), 2);
    assert_eq!(loader.state(), LoaderState::Ready);
}

#[test]
fn test_empty_segment_is_an_error() {
    let pl = playlist("media.m3u8", 0, 4, true);
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.set_playlist(pl);
    loader.load();
    fire_timer(&mut loader);
    answer(&mut loader, "media0.ts", &[]);

    let expected = LoaderError::EmptyContent {
        url: "media0.ts".to_owned(),
    };
    assert_eq!(loader.state(), LoaderState::Ready);
    assert!(loader.paused());
    assert!(loader.pending_segment().is_none());
    assert_eq!(loader.error(), Some(&expected));
    assert!(events(&receiver).contains(&LoaderEvent::Error(expected)));
    assert!(loader.clock().timers.is_empty());
    assert!(loader.source_buffer().buffer().calls.is_empty());
    assert_eq!(loader.stats().media_requests_errored, 1);
}

#[test]
fn test_network_failure_is_an_error() {
    let pl = playlist("media.m3u8", 0, 4, true);
    let mut loader = started_loader(&pl);
    let id = loader.transport().id_for("media0.ts").unwrap();
    loader.on_request_finished(id, Err(FetchFailure::Http(Some(500))));
    assert_eq!(
        loader.error(),
        Some(&LoaderError::NetworkFailure {
            url: "media0.ts".to_owned(),
            status: Some(500)
        })
    );
    assert!(loader.paused());

    // loading resumes from the same segment
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media0.ts", "media0.ts"]);
}

#[test]
fn test_key_timeout_aborts_segment_request() {
    let pl = playlist("media.m3u8", 0, 4, true);
    pl.borrow_mut().segments[0].key = Some(KeyInfo {
        uri: "key.bin".to_owned(),
        iv: None,
    });
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.set_playlist(pl);
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["key.bin", "media0.ts"]);

    let key_id = loader.transport().id_for("key.bin").unwrap();
    let segment_id = loader.transport().id_for("media0.ts").unwrap();
    loader.on_request_finished(key_id, Err(FetchFailure::TimedOut));

    assert_eq!(loader.transport().aborted, vec![segment_id]);
    assert_eq!(loader.state(), LoaderState::Ready);
    assert!(!loader.paused());
    assert!(loader.error().is_none());
    assert_eq!(loader.stats().media_requests_timedout, 1);
    assert_eq!(loader.stats().round_trip, None);
    assert_eq!(loader.bandwidth(), 1.);
    assert!(events(&receiver).contains(&LoaderEvent::BandwidthUpdate));
    assert_eq!(loader.clock().timers.len(), 1);
}

#[test]
fn test_encrypted_segment_is_decrypted_before_push() {
    let pl = playlist("media.m3u8", 5, 4, true);
    for segment in pl.borrow_mut().segments.iter_mut() {
        segment.key = Some(KeyInfo {
            uri: "key.bin".to_owned(),
            iv: None,
        });
    }
    let mut loader = started_loader(&pl);
    answer(&mut loader, "key.bin", &[7; 16]);
    assert_eq!(loader.state(), LoaderState::Waiting);
    answer(&mut loader, "media5.ts", &[9, 9]);

    let mut iv = [0; 16];
    iv[15] = 5;
    assert_eq!(
        loader.decrypter_mut().jobs,
        vec![DecryptionJob {
            id: 1,
            data: vec![9, 9],
            key: [7; 16],
            iv,
        }]
    );
    assert_eq!(loader.state(), LoaderState::Waiting);
    assert!(loader.source_buffer().buffer().calls.is_empty());

    // unrelated jobs are ignored
    loader.on_decrypted(42, Ok(vec![0]));
    assert!(loader.source_buffer().buffer().calls.is_empty());

    loader.on_decrypted(1, Ok(vec![1, 2]));
    assert_eq!(loader.source_buffer().buffer().appended(), vec![&[1u8, 2][..]]);
    assert!(loader.pending_segment().unwrap().timings().decrypt_end.is_some());

    // the key is only loaded once
    finish_buffer_operation(&mut loader);
    fire_timer(&mut loader);
    assert_eq!(
        requested_urls(&loader),
        vec!["key.bin", "media5.ts", "media6.ts"]
    );
}

#[test]
fn test_explicit_iv_is_used() {
    let pl = playlist("media.m3u8", 0, 4, true);
    pl.borrow_mut().segments[0].key = Some(KeyInfo {
        uri: "key.bin".to_owned(),
        iv: Some([3; 16]),
    });
    let mut loader = started_loader(&pl);
    answer(&mut loader, "key.bin", &[7; 16]);
    answer(&mut loader, "media0.ts", &[9]);
    assert_eq!(loader.decrypter_mut().jobs[0].iv, [3; 16]);

    loader.on_decrypted(1, Err(crate::decrypter::DecryptionError::Padding));
    assert!(matches!(
        loader.error(),
        Some(LoaderError::FatalDecodeError { .. })
    ));
    assert!(loader.paused());
    assert_eq!(loader.stats().media_requests_errored, 1);
}

#[test]
fn test_refresh_shifts_pending_segment() {
    let old = playlist("live.m3u8", 10, 5, false);
    let mut loader = new_loader();
    loader.set_playlist(old.clone());
    loader.update_observation(played_at(31.));
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["live13.ts"]);
    assert_eq!(loader.pending_segment().unwrap().media_index(), 3);

    let new = playlist("live.m3u8", 12, 5, false);
    loader.set_playlist(new.clone());
    let pending = loader.pending_segment().unwrap();
    assert_eq!(pending.media_index(), 1);
    assert!(Rc::ptr_eq(pending.playlist(), &new));
    assert_eq!(pending.segment().uri, "live13.ts");
    assert_eq!(loader.state(), LoaderState::Waiting);
}

#[test]
fn test_refresh_saves_expired_timing() {
    let old = playlist("live.m3u8", 10, 5, false);
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.set_playlist(old.clone());
    loader.update_observation(played_at(0.));
    loader.load();
    fire_timer(&mut loader);
    answer(&mut loader, "live10.ts", &[1]);
    finish_buffer_operation(&mut loader);
    assert_eq!(loader.media_index(), Some(0));

    let new = playlist("live.m3u8", 11, 5, false);
    loader.set_playlist(new.clone());
    assert_eq!(loader.media_index(), Some(-1));
    assert_eq!(
        new.borrow().sync_info,
        Some(SyncInfo {
            media_sequence: 10,
            time: 0.
        })
    );

    loader.source_buffer_mut().buffer_mut().buffered = TimeRanges::from_flat_list(&[0., 10.]);
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["live10.ts", "live11.ts"]);
    assert_eq!(loader.pending_segment().unwrap().start_of_segment(), Some(10.));
}

#[test]
fn test_refresh_shifts_sync_point() {
    let old = playlist("live.m3u8", 10, 3, false);
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.demuxer_mut().set_timings(&[3], 20., 30.);
    loader.set_playlist(old);
    loader.update_observation(played_at(0.));
    loader.load();
    for (url, data) in [("live10.ts", 1u8), ("live11.ts", 2), ("live12.ts", 3)] {
        fire_timer(&mut loader);
        answer(&mut loader, url, &[data]);
        finish_buffer_operation(&mut loader);
    }
    assert_eq!(loader.media_index(), Some(2));
    assert_eq!(loader.sync_point().map(|s| s.segment_index), Some(0));

    // live13 and live14 expired between both versions
    let new = playlist("live.m3u8", 15, 3, false);
    loader.set_playlist(new);
    assert_eq!(loader.media_index(), Some(-3));
    assert_eq!(loader.sync_point().map(|s| s.segment_index), Some(-5));

    loader.update_observation(played_at(25.));
    loader.source_buffer_mut().buffer_mut().buffered = TimeRanges::from_flat_list(&[0., 30.]);
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader).last().unwrap(), "live15.ts");
    assert_eq!(loader.pending_segment().unwrap().start_of_segment(), Some(50.));
}

#[test]
fn test_refresh_keeps_learned_timings() {
    let old = playlist("live.m3u8", 10, 3, false);
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.set_playlist(old);
    loader.update_observation(played_at(0.));
    loader.load();
    for (url, data) in [("live10.ts", 1u8), ("live11.ts", 2)] {
        fire_timer(&mut loader);
        answer(&mut loader, url, &[data]);
        finish_buffer_operation(&mut loader);
    }

    let same = playlist("live.m3u8", 10, 4, false);
    loader.set_playlist(same.clone());
    assert_eq!(same.borrow().segments[0].start, Some(0.));
    assert_eq!(same.borrow().segments[1].end, Some(20.));
    assert_eq!(same.borrow().segments[3].start, None);

    let next = playlist("live.m3u8", 11, 4, false);
    loader.set_playlist(next.clone());
    assert_eq!(next.borrow().segments[0].start, Some(10.));
    let sync_point = loader
        .sync_controller()
        .get_sync_point(&next.borrow(), 15., Some(0))
        .unwrap();
    assert_eq!(sync_point.strategy, SyncStrategy::Segment);
    assert_eq!((sync_point.time, sync_point.segment_index), (10., 0));
}

#[test]
fn test_sync_request_is_not_pushed() {
    let first = playlist("a.m3u8", 0, 4, false);
    let other = playlist("b.m3u8", 0, 4, false);
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.set_playlist(first);
    loader.update_observation(played_at(0.));
    loader.load();
    fire_timer(&mut loader);
    answer(&mut loader, "a0.ts", &[1]);
    finish_buffer_operation(&mut loader);

    loader.set_playlist(other.clone());
    assert_eq!(loader.media_index(), None);
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader).last().unwrap(), "b1.ts");
    assert!(loader.pending_segment().unwrap().is_sync_request());

    answer(&mut loader, "b1.ts", &[2]);
    assert_eq!(loader.state(), LoaderState::Ready);
    assert_eq!(loader.source_buffer().buffer().appended(), vec![&[1u8][..]]);
    assert_eq!(other.borrow().segments[1].start, Some(10.));

    // learned timings are used to find the segment actually needed
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader).last().unwrap(), "b0.ts");
    assert!(!loader.pending_segment().unwrap().is_sync_request());
    assert_eq!(loader.pending_segment().unwrap().start_of_segment(), Some(0.));
}

#[test]
fn test_undecodable_sync_segment_is_fatal() {
    let first = playlist("a.m3u8", 0, 4, false);
    let other = playlist("b.m3u8", 0, 4, false);
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader
        .demuxer_mut()
        .timings
        .insert(vec![2], Err(ProbeError("unreadable container".to_owned())));
    loader.set_playlist(first);
    loader.update_observation(played_at(0.));
    loader.load();
    fire_timer(&mut loader);
    answer(&mut loader, "a0.ts", &[1]);
    finish_buffer_operation(&mut loader);

    loader.set_playlist(other);
    fire_timer(&mut loader);
    assert!(loader.pending_segment().unwrap().is_sync_request());
    answer(&mut loader, "b1.ts", &[2]);

    let expected = LoaderError::FatalDecodeError {
        url: "b1.ts".to_owned(),
        reason: "unreadable container".to_owned(),
    };
    assert_eq!(loader.error(), Some(&expected));
    assert!(events(&receiver).contains(&LoaderEvent::Error(expected)));
    assert_eq!(loader.state(), LoaderState::Ready);
    assert!(loader.paused());
    assert!(loader.pending_segment().is_none());
    assert_eq!(loader.stats().media_requests_errored, 1);
    assert_eq!(loader.source_buffer().buffer().appended(), vec![&[1u8][..]]);
}

#[test]
fn test_discontinuity_sets_timestamp_offset() {
    let mut segments: Vec<Segment> = (0..4)
        .map(|idx| Segment::new(&format!("media{}.ts", idx), 10.))
        .collect();
    segments[2].discontinuity = true;
    let pl = Playlist::new("media.m3u8", 0, 0, 10., segments, true).into_ref();
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.demuxer_mut().set_timings(&[3], 1000., 1010.);
    loader.set_playlist(pl.clone());
    loader.update_observation(played_at(0.));
    loader.load();
    for (url, data) in [("media0.ts", 1u8), ("media1.ts", 2)] {
        fire_timer(&mut loader);
        answer(&mut loader, url, &[data]);
        finish_buffer_operation(&mut loader);
    }
    assert!(!loader
        .source_buffer()
        .buffer()
        .calls
        .iter()
        .any(|c| matches!(c, BufferCall::SetTimestampOffset(_))));

    fire_timer(&mut loader);
    let pending = loader.pending_segment().unwrap();
    assert_eq!(pending.segment().uri, "media2.ts");
    assert_eq!(pending.timestamp_offset(), Some(20.));

    events(&receiver);
    answer(&mut loader, "media2.ts", &[3]);
    assert_eq!(pl.borrow().segments[2].start, Some(20.));
    assert_eq!(pl.borrow().segments[2].end, Some(30.));
    let calls = &loader.source_buffer().buffer().calls;
    assert_eq!(
        &calls[calls.len() - 2..],
        &[BufferCall::SetTimestampOffset(20.), BufferCall::Append(vec![3])][..]
    );
    let received = events(&receiver);
    assert!(received.contains(&LoaderEvent::TimestampOffset(20.)));
    assert!(received.contains(&LoaderEvent::SegmentTimeMapping {
        timeline: 1,
        mapping: -980.
    }));
}

#[test]
fn test_segment_before_timestamp_offset_resets_it() {
    let pl = playlist("media.m3u8", 0, 10, true);
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[3], 20., 30.);
    loader.set_playlist(pl);
    loader.update_observation(played_at(25.));
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media2.ts"]);
    answer(&mut loader, "media2.ts", &[3]);
    finish_buffer_operation(&mut loader);
    assert_eq!(loader.source_buffer().timestamp_offset(), 20.);

    // seeking back on the same timeline
    loader.update_observation(MediaObservation {
        seeking: true,
        ..played_at(5.)
    });
    loader.reset_loader();
    fire_timer(&mut loader);
    let pending = loader.pending_segment().unwrap();
    assert_eq!(pending.segment().uri, "media0.ts");
    assert_eq!(pending.timeline(), 0);
    assert_eq!(pending.start_of_segment(), Some(0.));
    assert_eq!(pending.timestamp_offset(), Some(0.));
}

#[test]
fn test_init_segment_is_loaded_and_pushed_once() {
    let pl = playlist("media.m3u8", 0, 4, true);
    for (idx, segment) in pl.borrow_mut().segments.iter_mut().enumerate() {
        let first_byte = if idx < 2 { 0 } else { 720 };
        segment.map = Some(MapInfo {
            uri: "init.mp4".to_owned(),
            byte_range: Some(ByteRange {
                first_byte,
                last_byte: first_byte + 719,
            }),
        });
    }
    let mut loader = new_loader();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.demuxer_mut().set_timings(&[2], 10., 20.);
    loader.set_playlist(pl);
    loader.update_observation(played_at(0.));
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["init.mp4", "media0.ts"]);
    answer(&mut loader, "init.mp4", &[5]);
    answer(&mut loader, "media0.ts", &[1]);
    // initialization segment, then media segment
    finish_buffer_operation(&mut loader);
    finish_buffer_operation(&mut loader);

    fire_timer(&mut loader);
    assert_eq!(
        requested_urls(&loader),
        vec!["init.mp4", "media0.ts", "media1.ts"]
    );
    answer(&mut loader, "media1.ts", &[2]);
    finish_buffer_operation(&mut loader);
    assert_eq!(
        loader.source_buffer().buffer().appended(),
        vec![&[5u8][..], &[1][..], &[2][..]]
    );
    assert_eq!(loader.demuxer_mut().probed[1], (Some(vec![5]), vec![2]));

    // another byte range of the same resource is another initialization segment
    fire_timer(&mut loader);
    let last_requests = &loader.transport().requests[3..];
    assert_eq!(last_requests[0].url, "init.mp4");
    assert_eq!(
        last_requests[0].byte_range,
        Some(ByteRange {
            first_byte: 720,
            last_byte: 1439
        })
    );
    assert_eq!(last_requests[1].url, "media2.ts");
}

#[test]
fn test_drift_resets_everything() {
    let pl = playlist("media.m3u8", 0, 20, true);
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.demuxer_mut().set_timings(&[1], 0., 10.);
    loader.set_playlist(pl);
    loader.load();
    fire_timer(&mut loader);
    answer(&mut loader, "media0.ts", &[1]);

    loader.update_observation(played_at(45.));
    loader.source_buffer_mut().buffer_mut().buffered = TimeRanges::from_flat_list(&[0., 10.]);
    events(&receiver);
    finish_buffer_operation(&mut loader);

    let received = events(&receiver);
    assert!(received.contains(&LoaderEvent::ResetEverything));
    assert!(!received.contains(&LoaderEvent::Progress));
    assert_eq!(loader.media_index(), None);
    assert_eq!(
        loader.source_buffer().buffer().calls.last(),
        Some(&BufferCall::Remove(0., f64::INFINITY))
    );
}

#[test]
fn test_back_buffer_is_trimmed() {
    let pl = playlist("media.m3u8", 0, 20, true);
    let mut loader = new_loader();
    loader.set_playlist(pl);
    loader.update_observation(played_at(105.));
    loader.load();
    loader.source_buffer_mut().buffer_mut().buffered = TimeRanges::from_flat_list(&[0., 110.]);
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media10.ts"]);
    assert_eq!(
        loader.source_buffer().buffer().calls,
        vec![BufferCall::Remove(0., 75.)]
    );
}

#[test]
fn test_back_buffer_is_trimmed_to_seekable_start() {
    let pl = playlist("media.m3u8", 0, 20, true);
    let mut loader = new_loader();
    loader.set_playlist(pl);
    loader.update_observation(MediaObservation {
        seekable_start: Some(60.),
        ..played_at(105.)
    });
    loader.load();
    loader.source_buffer_mut().buffer_mut().buffered = TimeRanges::from_flat_list(&[0., 110.]);
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["media10.ts"]);
    assert_eq!(
        loader.source_buffer().buffer().calls,
        vec![BufferCall::Remove(0., 60.)]
    );
}

#[test]
fn test_abort_while_waiting() {
    let pl = playlist("media.m3u8", 0, 4, true);
    let mut loader = started_loader(&pl);
    let id = loader.transport().id_for("media0.ts").unwrap();
    loader.abort();
    assert_eq!(loader.transport().aborted, vec![id]);
    assert!(loader.transport().pending().is_empty());
    assert_eq!(loader.state(), LoaderState::Ready);
    assert!(loader.pending_segment().is_none());
    assert_eq!(loader.stats().media_requests_aborted, 1);
    assert_eq!(loader.clock().timers.len(), 1);

    // late answer is ignored
    answer(&mut loader, "media0.ts", &[1]);
    assert!(loader.source_buffer().buffer().calls.is_empty());
}

#[test]
fn test_dispose() {
    let pl = playlist("media.m3u8", 0, 4, true);
    let mut loader = started_loader(&pl);
    let id = loader.transport().id_for("media0.ts").unwrap();
    loader.dispose();
    assert_eq!(loader.state(), LoaderState::Disposed);
    assert_eq!(loader.transport().aborted, vec![id]);

    loader.load();
    assert_eq!(loader.state(), LoaderState::Disposed);
    assert!(loader.clock().timers.is_empty());
    loader.on_request_finished(id, Ok(FetchedResource {
        data: vec![1],
        duration_ms: 10.,
    }));
    assert!(loader.source_buffer().buffer().calls.is_empty());
}

fn renditions() -> Vec<Rendition> {
    vec![
        Rendition::new("low.m3u8", Some(500_000.), None),
        Rendition::new("high.m3u8", Some(4_000_000.), None),
    ]
}

/// Loader knowing both renditions, waiting for the first segment of the highest one.
fn loader_on_high_rendition() -> (TestLoader, Receiver<LoaderEvent>) {
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.config_mut().initial_bandwidth = 10_000_000.;
    loader.set_renditions(renditions());
    assert_eq!(loader.select_rendition().unwrap().uri, "high.m3u8");
    loader.set_playlist(playlist("high.m3u8", 0, 4, true));
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["high0.ts"]);
    events(&receiver);
    (loader, receiver)
}

#[test]
fn test_timeout_switches_to_lowest_rendition() {
    let (mut loader, receiver) = loader_on_high_rendition();
    let id = loader.transport().id_for("high0.ts").unwrap();
    loader.on_request_finished(id, Err(FetchFailure::TimedOut));

    assert_eq!(loader.bandwidth(), 1.);
    assert!(events(&receiver).contains(&LoaderEvent::RenditionSwitch("low.m3u8".to_owned())));
    assert_eq!(loader.select_rendition().unwrap().uri, "low.m3u8");
    assert!(loader.renditions().iter().all(|r| r.exclude_until.is_none()));
    assert!(loader.error().is_none());
    assert!(!loader.paused());
}

#[test]
fn test_failed_rendition_is_blacklisted() {
    let (mut loader, receiver) = loader_on_high_rendition();
    loader.clock_mut().now = 1000.;
    let id = loader.transport().id_for("high0.ts").unwrap();
    loader.on_request_finished(id, Err(FetchFailure::Http(Some(500))));

    let received = events(&receiver);
    assert!(matches!(
        loader.error(),
        Some(LoaderError::NetworkFailure { .. })
    ));
    assert!(received.contains(&LoaderEvent::RenditionSwitch("low.m3u8".to_owned())));
    assert_eq!(loader.renditions()[1].exclude_until, Some(301_000.));
    assert_eq!(loader.stats().media_requests_errored, 1);
    assert!(loader.paused());

    // the host follows the switch
    loader.set_playlist(playlist("low.m3u8", 0, 4, true));
    loader.load();
    fire_timer(&mut loader);
    assert_eq!(requested_urls(&loader), vec!["high0.ts", "low0.ts"]);
}

#[test]
fn test_failure_without_alternative_rendition_is_fatal() {
    let mut loader = new_loader();
    let receiver = loader.subscribe();
    loader.set_renditions(vec![Rendition::new("media.m3u8", Some(500_000.), None)]);
    loader.set_playlist(playlist("media.m3u8", 0, 4, true));
    loader.load();
    fire_timer(&mut loader);
    let id = loader.transport().id_for("media0.ts").unwrap();
    loader.on_request_finished(id, Err(FetchFailure::Http(Some(404))));

    let expected = LoaderError::NoAlternativeRendition {
        url: "media.m3u8".to_owned(),
    };
    assert_eq!(loader.error(), Some(&expected));
    let received = events(&receiver);
    assert!(received.contains(&LoaderEvent::Error(expected)));
    assert!(!received
        .iter()
        .any(|e| matches!(e, LoaderEvent::RenditionSwitch(_))));
    assert!(loader.paused());
    assert!(loader.blacklist_rendition("unknown.m3u8", None).is_none());
}
