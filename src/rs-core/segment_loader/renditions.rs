use super::{LoaderError, SegmentLoader};
use crate::{
    adaptive::{Rendition, Resolution, SelectorError},
    environment::{Clock, Environment},
    events::LoaderEvent,
    Logger,
};

/// Rendition choice, driven by the bandwidth estimate of the loader.
///
/// Nothing happens here as long as no rendition has been announced through
/// `set_renditions`: the host then stays in charge of choosing the playlist to load.
impl<E: Environment> SegmentLoader<E> {
    /// Announce the renditions the content is available in.
    pub fn set_renditions(&mut self, renditions: Vec<Rendition>) {
        Logger::info(&format!(
            "SegmentLoader: {} rendition(s) announced",
            renditions.len()
        ));
        self.rendition_selector.set_renditions(renditions);
    }

    pub fn renditions(&self) -> &[Rendition] {
        self.rendition_selector.renditions()
    }

    /// Update the dimensions of the area the content is displayed in, `None` if unknown.
    pub fn set_viewport(&mut self, viewport: Option<Resolution>) {
        self.rendition_selector.set_viewport(viewport);
    }

    /// Choose the rendition to load for the current bandwidth estimate.
    ///
    /// Returns `None` if no rendition was announced or if all are blacklisted.
    pub fn select_rendition(&mut self) -> Option<&Rendition> {
        let bandwidth = self.bandwidth();
        let now = self.clock.now();
        self.rendition_selector.select(bandwidth, now)
    }

    /// Prevent the rendition with the given playlist URI from being selected for `duration`
    /// milliseconds, or for the default blacklist duration if `None`.
    ///
    /// Returns the rendition to load instead. If there is none, a
    /// `LoaderError::NoAlternativeRendition` error is reported and loading is paused.
    pub fn blacklist_rendition(&mut self, uri: &str, duration: Option<f64>) -> Option<Rendition> {
        let now = self.clock.now();
        match self.rendition_selector.blacklist(uri, duration, now) {
            Ok(rendition) => {
                let rendition = rendition.clone();
                self.announce_rendition(&rendition.uri);
                Some(rendition)
            }
            Err(SelectorError::NoAlternative(url)) => {
                self.on_fatal_error(LoaderError::NoAlternativeRendition { url });
                None
            }
            Err(err @ SelectorError::UnknownRendition(_)) => {
                Logger::warn(&format!("SegmentLoader: {}", err));
                None
            }
        }
    }

    /// Choose the rendition again after the bandwidth estimate changed.
    pub(super) fn update_rendition(&mut self) {
        if self.rendition_selector.renditions().is_empty() {
            return;
        }
        if let Some(uri) = self.select_rendition().map(|r| r.uri.clone()) {
            self.announce_rendition(&uri);
        }
    }

    /// Blacklist the rendition segments were loaded from, after they could not be loaded or
    /// decoded.
    pub(super) fn blacklist_current_rendition(&mut self) {
        let Some(uri) = self.playlist.as_ref().map(|p| p.borrow().uri.clone()) else {
            return;
        };
        if self.renditions().iter().any(|r| r.uri == uri) {
            self.blacklist_rendition(&uri, None);
        }
    }

    fn announce_rendition(&mut self, uri: &str) {
        let is_current = self
            .playlist
            .as_ref()
            .map_or(false, |p| p.borrow().uri == uri);
        if !is_current {
            Logger::info(&format!("SegmentLoader: switching to rendition {}", uri));
            self.notifier.emit(LoaderEvent::RenditionSwitch(uri.to_owned()));
        }
    }
}
