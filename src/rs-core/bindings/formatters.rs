use crate::{
    events::LoaderEvent,
    playlist::ByteRange,
    segment_loader::{LoaderError, LoaderState},
};

use super::{LoaderErrorCode, LoaderEventType, SegmentLoaderState};

pub(crate) fn format_range_for_js(original: Option<&ByteRange>) -> (Option<usize>, Option<usize>) {
    match original {
        None => (None, None),
        Some(ByteRange {
            first_byte,
            last_byte,
        }) => (Some(*first_byte), Some(*last_byte)),
    }
}

pub(crate) fn format_state_for_js(state: LoaderState) -> SegmentLoaderState {
    match state {
        LoaderState::Init => SegmentLoaderState::Init,
        LoaderState::Ready => SegmentLoaderState::Ready,
        LoaderState::Waiting => SegmentLoaderState::Waiting,
        LoaderState::Appending => SegmentLoaderState::Appending,
        LoaderState::Disposed => SegmentLoaderState::Disposed,
    }
}

/// Returns the error code, url and HTTP status to communicate to JS for that error.
pub(crate) fn format_loader_error_for_js(err: &LoaderError) -> (LoaderErrorCode, &str, Option<u32>) {
    match err {
        LoaderError::NetworkFailure { url, status } => {
            (LoaderErrorCode::NetworkFailure, url, *status)
        }
        LoaderError::Timeout { url } => (LoaderErrorCode::Timeout, url, None),
        LoaderError::Aborted { url } => (LoaderErrorCode::Aborted, url, None),
        LoaderError::EmptyContent { url } => (LoaderErrorCode::EmptyContent, url, None),
        LoaderError::InvalidKey { url } => (LoaderErrorCode::InvalidKey, url, None),
        LoaderError::FatalDecodeError { url, .. } => {
            (LoaderErrorCode::FatalDecodeError, url, None)
        }
        LoaderError::NoAlternativeRendition { url } => {
            (LoaderErrorCode::NoAlternativeRendition, url, None)
        }
    }
}

/// Returns the type and values to communicate through `jsAnnounceLoaderEvent` for that event.
///
/// Returns `None` for events with a dedicated JS function.
pub(crate) fn format_event_for_js(
    event: &LoaderEvent,
) -> Option<(LoaderEventType, Option<f64>, Option<f64>)> {
    match event {
        LoaderEvent::Progress => Some((LoaderEventType::Progress, None, None)),
        LoaderEvent::SyncInfoUpdate => Some((LoaderEventType::SyncInfoUpdate, None, None)),
        LoaderEvent::BandwidthUpdate => Some((LoaderEventType::BandwidthUpdate, None, None)),
        LoaderEvent::TimestampOffset(offset) => {
            Some((LoaderEventType::TimestampOffset, Some(*offset), None))
        }
        LoaderEvent::SegmentTimeMapping { timeline, mapping } => Some((
            LoaderEventType::SegmentTimeMapping,
            Some(*timeline as f64),
            Some(*mapping),
        )),
        LoaderEvent::ResetEverything => Some((LoaderEventType::ResetEverything, None, None)),
        LoaderEvent::Ended => Some((LoaderEventType::Ended, None, None)),
        LoaderEvent::StateChange(_)
        | LoaderEvent::Error(_)
        | LoaderEvent::RenditionSwitch(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_range() {
        assert_eq!(format_range_for_js(None), (None, None));
        let range = ByteRange {
            first_byte: 10,
            last_byte: 99,
        };
        assert_eq!(format_range_for_js(Some(&range)), (Some(10), Some(99)));
    }

    #[test]
    fn test_format_loader_error() {
        let err = LoaderError::NetworkFailure {
            url: "seg.ts".to_owned(),
            status: Some(404),
        };
        assert_eq!(
            format_loader_error_for_js(&err),
            (LoaderErrorCode::NetworkFailure, "seg.ts", Some(404))
        );
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event_for_js(&LoaderEvent::SegmentTimeMapping {
                timeline: 2,
                mapping: -10.
            }),
            Some((LoaderEventType::SegmentTimeMapping, Some(2.), Some(-10.)))
        );
        assert_eq!(format_event_for_js(&LoaderEvent::StateChange(LoaderState::Ready)), None);
        assert_eq!(
            format_event_for_js(&LoaderEvent::RenditionSwitch("low.m3u8".to_owned())),
            None
        );
    }
}
