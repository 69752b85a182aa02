use serde::Deserialize;
use thiserror::Error;

use crate::{config::SelectorConfiguration, utils::logger::Logger};

/// Width and height, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if both dimensions are at least those of `other`.
    fn covers(&self, other: &Resolution) -> bool {
        self.width >= other.width && self.height >= other.height
    }

    fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// One alternative encoding of the content, as announced by the multivariant playlist.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rendition {
    pub uri: String,

    /// Peak bitrate announced for that rendition, in bits per second.
    ///
    /// Renditions without one are considered infinitely costly.
    #[serde(default)]
    pub bandwidth: Option<f64>,

    #[serde(default)]
    pub resolution: Option<Resolution>,

    /// Monotonic timestamp, in milliseconds, until which that rendition must not be selected.
    #[serde(skip)]
    pub exclude_until: Option<f64>,
}

impl Rendition {
    pub fn new(uri: &str, bandwidth: Option<f64>, resolution: Option<Resolution>) -> Self {
        Self {
            uri: uri.to_owned(),
            bandwidth,
            resolution,
            exclude_until: None,
        }
    }

    /// Parse the list of renditions from a JSON array, as produced by an external
    /// multivariant playlist parser.
    pub fn list_from_json(json: &str) -> Result<Vec<Rendition>, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn is_enabled(&self, now: f64) -> bool {
        self.exclude_until.map_or(true, |until| now >= until)
    }

    fn declared_bandwidth(&self) -> f64 {
        self.bandwidth.unwrap_or(f64::MAX)
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum SelectorError {
    #[error("No alternative rendition left after blacklisting {0}")]
    NoAlternative(String),
    #[error("Unknown rendition: {0}")]
    UnknownRendition(String),
}

/// Chooses the rendition to load depending on the current bandwidth estimate and on the
/// size of the area the content is displayed in.
///
/// Renditions which recently failed may be blacklisted for some time.
pub struct RenditionSelector {
    renditions: Vec<Rendition>,

    /// Factor applied to each rendition's declared bandwidth before comparing it to the
    /// estimate.
    bandwidth_variance: f64,

    /// Time, in milliseconds, a blacklisted rendition stays excluded by default.
    blacklist_duration: f64,

    viewport: Option<Resolution>,
    last_bandwidth: f64,
    current: Option<usize>,
}

impl RenditionSelector {
    pub fn new(renditions: Vec<Rendition>, bandwidth_variance: f64, blacklist_duration: f64) -> Self {
        Self {
            renditions,
            bandwidth_variance,
            blacklist_duration,
            viewport: None,
            last_bandwidth: 0.,
            current: None,
        }
    }

    pub fn from_config(config: &SelectorConfiguration) -> Self {
        Self::new(vec![], config.bandwidth_variance, config.blacklist_duration)
    }

    /// Replace the renditions to choose from, forgetting the previous choice.
    pub fn set_renditions(&mut self, renditions: Vec<Rendition>) {
        self.renditions = renditions;
        self.current = None;
    }

    pub fn renditions(&self) -> &[Rendition] {
        &self.renditions
    }

    pub fn current(&self) -> Option<&Rendition> {
        self.current.and_then(|idx| self.renditions.get(idx))
    }

    /// Update the dimensions of the area the content is displayed in, `None` if unknown.
    pub fn set_viewport(&mut self, viewport: Option<Resolution>) {
        self.viewport = viewport;
    }

    /// Choose the rendition to play for the given `bandwidth` estimate, in bits per second,
    /// at the monotonic time `now`, in milliseconds.
    ///
    /// Returns `None` only when every rendition is currently excluded.
    pub fn select(&mut self, bandwidth: f64, now: f64) -> Option<&Rendition> {
        self.last_bandwidth = bandwidth;
        self.current = self.choose(bandwidth, now);
        if let Some(rendition) = self.current() {
            Logger::lazy_debug(&|| {
                format!(
                    "Selector: selecting {} for a bandwidth of {}",
                    rendition.uri, bandwidth
                )
            });
        }
        self.current()
    }

    /// Exclude the rendition with the given `uri` for `duration` milliseconds (the
    /// configured blacklist duration if `None`), then select again with the last known
    /// bandwidth.
    ///
    /// Fails with `SelectorError::NoAlternative` when no other rendition could be selected,
    /// which the caller has to treat as fatal.
    pub fn blacklist(
        &mut self,
        uri: &str,
        duration: Option<f64>,
        now: f64,
    ) -> Result<&Rendition, SelectorError> {
        let idx = self
            .renditions
            .iter()
            .position(|r| r.uri == uri)
            .ok_or_else(|| SelectorError::UnknownRendition(uri.to_owned()))?;
        if self.renditions.len() == 1 {
            Logger::error(&format!("Selector: cannot blacklist lone rendition {}", uri));
            return Err(SelectorError::NoAlternative(uri.to_owned()));
        }
        let duration = duration.unwrap_or(self.blacklist_duration);
        Logger::warn(&format!(
            "Selector: blacklisting {} for {}ms",
            uri, duration
        ));
        self.renditions[idx].exclude_until = Some(now + duration);
        let bandwidth = self.last_bandwidth;
        match self.select(bandwidth, now) {
            Some(rendition) => Ok(rendition),
            None => Err(SelectorError::NoAlternative(uri.to_owned())),
        }
    }

    fn choose(&self, bandwidth: f64, now: f64) -> Option<usize> {
        let mut enabled: Vec<usize> = (0..self.renditions.len())
            .filter(|idx| self.renditions[*idx].is_enabled(now))
            .collect();
        enabled.sort_by(|a, b| {
            self.renditions[*a]
                .declared_bandwidth()
                .total_cmp(&self.renditions[*b].declared_bandwidth())
        });
        let lowest = *enabled.first()?;

        let eligible: Vec<usize> = enabled
            .into_iter()
            .filter(|idx| {
                self.renditions[*idx].declared_bandwidth() * self.bandwidth_variance <= bandwidth
            })
            .collect();
        let Some(&bandwidth_best) = eligible.last() else {
            return Some(lowest);
        };

        let viewport = match self.viewport {
            Some(viewport) => viewport,
            None => return Some(bandwidth_best),
        };
        let with_resolution: Vec<(usize, Resolution)> = eligible
            .iter()
            .filter_map(|idx| self.renditions[*idx].resolution.map(|res| (*idx, res)))
            .collect();
        if with_resolution.is_empty() {
            return Some(bandwidth_best);
        }

        // Iteration is in ascending bandwidth order, so on equal resolutions the last seen
        // has the highest bandwidth.
        let mut covering: Option<(usize, Resolution)> = None;
        let mut below: Option<(usize, Resolution)> = None;
        for (idx, res) in with_resolution {
            if res.covers(&viewport) {
                if covering.map_or(true, |(_, c)| res.area() <= c.area()) {
                    covering = Some((idx, res));
                }
            } else if below.map_or(true, |(_, b)| res.area() >= b.area()) {
                below = Some((idx, res));
            }
        }
        covering.or(below).map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renditions() -> Vec<Rendition> {
        vec![
            Rendition::new("low.m3u8", Some(500_000.), Some(Resolution::new(640, 360))),
            Rendition::new("mid.m3u8", Some(1_500_000.), Some(Resolution::new(1280, 720))),
            Rendition::new("mid2.m3u8", Some(2_000_000.), Some(Resolution::new(1280, 720))),
            Rendition::new("high.m3u8", Some(4_000_000.), Some(Resolution::new(1920, 1080))),
        ]
    }

    fn selected_uri(selector: &mut RenditionSelector, bandwidth: f64) -> Option<String> {
        selector.select(bandwidth, 0.).map(|r| r.uri.clone())
    }

    #[test]
    fn test_bandwidth_optimal_without_viewport() {
        let mut selector = RenditionSelector::new(renditions(), 1.2, 300_000.);
        assert_eq!(selected_uri(&mut selector, 10_000_000.).as_deref(), Some("high.m3u8"));
        // 4Mbps * 1.2 does not fit in 4.5Mbps
        assert_eq!(selected_uri(&mut selector, 4_500_000.).as_deref(), Some("mid2.m3u8"));
        assert_eq!(selected_uri(&mut selector, 600_000.).as_deref(), Some("low.m3u8"));
    }

    #[test]
    fn test_lowest_when_nothing_eligible() {
        let mut selector = RenditionSelector::new(renditions(), 1.2, 300_000.);
        assert_eq!(selected_uri(&mut selector, 1.).as_deref(), Some("low.m3u8"));
    }

    #[test]
    fn test_smallest_covering_resolution() {
        let mut selector = RenditionSelector::new(renditions(), 1.2, 300_000.);
        selector.set_viewport(Some(Resolution::new(1000, 600)));
        // both 720p renditions fit, the one with the highest bandwidth wins
        assert_eq!(selected_uri(&mut selector, 10_000_000.).as_deref(), Some("mid2.m3u8"));
        selector.set_viewport(Some(Resolution::new(1280, 720)));
        assert_eq!(selected_uri(&mut selector, 10_000_000.).as_deref(), Some("mid2.m3u8"));
    }

    #[test]
    fn test_largest_below_viewport() {
        let mut selector = RenditionSelector::new(renditions(), 1.2, 300_000.);
        selector.set_viewport(Some(Resolution::new(3840, 2160)));
        assert_eq!(selected_uri(&mut selector, 10_000_000.).as_deref(), Some("high.m3u8"));
        assert_eq!(selected_uri(&mut selector, 2_000_000.).as_deref(), Some("mid.m3u8"));
    }

    #[test]
    fn test_bandwidth_pick_without_resolutions() {
        let renditions = vec![
            Rendition::new("a.m3u8", Some(500_000.), None),
            Rendition::new("b.m3u8", Some(1_000_000.), None),
        ];
        let mut selector = RenditionSelector::new(renditions, 1.2, 300_000.);
        selector.set_viewport(Some(Resolution::new(640, 360)));
        assert_eq!(selected_uri(&mut selector, 5_000_000.).as_deref(), Some("b.m3u8"));
    }

    #[test]
    fn test_blacklist_reselects_and_expires() {
        let mut selector = RenditionSelector::new(renditions(), 1.2, 300_000.);
        selector.select(10_000_000., 0.);
        let fallback = selector.blacklist("high.m3u8", None, 1000.).unwrap();
        assert_eq!(fallback.uri, "mid2.m3u8");
        assert_eq!(selector.renditions()[3].exclude_until, Some(301_000.));
        assert_eq!(selector.select(10_000_000., 300_999.).unwrap().uri, "mid2.m3u8");
        assert_eq!(selector.select(10_000_000., 301_000.).unwrap().uri, "high.m3u8");
    }

    #[test]
    fn test_renditions_from_json() {
        let json = r#"[
            { "uri": "low.m3u8", "bandwidth": 500000, "resolution": { "width": 640, "height": 360 } },
            { "uri": "audio.m3u8" }
        ]"#;
        let parsed = Rendition::list_from_json(json).unwrap();
        assert_eq!(parsed[0], renditions()[0]);
        assert_eq!(parsed[1], Rendition::new("audio.m3u8", None, None));
        assert!(Rendition::list_from_json("{}").is_err());

        let mut selector = RenditionSelector::from_config(&SelectorConfiguration::default());
        assert!(selected_uri(&mut selector, 1.).is_none());
        selector.set_renditions(parsed);
        assert_eq!(selected_uri(&mut selector, 1.).as_deref(), Some("low.m3u8"));
    }

    #[test]
    fn test_blacklist_without_alternative_is_fatal() {
        let lone = vec![Rendition::new("only.m3u8", Some(1_000.), None)];
        let mut selector = RenditionSelector::new(lone, 1.2, 300_000.);
        selector.select(10_000., 0.);
        assert_eq!(
            selector.blacklist("only.m3u8", None, 0.),
            Err(SelectorError::NoAlternative("only.m3u8".to_owned()))
        );

        let pair = vec![
            Rendition::new("a.m3u8", Some(1_000.), None),
            Rendition::new("b.m3u8", Some(2_000.), None),
        ];
        let mut selector = RenditionSelector::new(pair, 1.2, 300_000.);
        assert!(selector.blacklist("a.m3u8", Some(10.), 0.).is_ok());
        assert_eq!(
            selector.blacklist("b.m3u8", Some(10.), 0.),
            Err(SelectorError::NoAlternative("b.m3u8".to_owned()))
        );
        assert_eq!(
            selector.blacklist("c.m3u8", None, 0.),
            Err(SelectorError::UnknownRendition("c.m3u8".to_owned()))
        );
    }
}
