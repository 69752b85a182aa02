#[derive(Clone, Debug, PartialEq)]
struct TimeRange {
    start: f64,
    end: f64,
}

/// Sorted, non-overlapping intervals of time, in seconds.
///
/// This is the shape under which the media buffer reports what it currently contains.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `TimeRanges` from a flat list of `start, end` couples, as communicated by
    /// JavaScript.
    ///
    /// A trailing lone value is ignored.
    pub fn from_flat_list(values: &[f64]) -> Self {
        let mut ranges = Self::new();
        values
            .chunks_exact(2)
            .for_each(|pair| ranges.add(pair[0], pair[1]));
        ranges
    }

    /// Insert the `start`-`end` interval, merging it with every range it touches. Empty or
    /// reversed intervals are ignored.
    pub fn add(&mut self, start: f64, end: f64) {
        if end <= start {
            return;
        }
        let mut added = TimeRange { start, end };
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        let mut inserted = false;
        for range in self.ranges.drain(..) {
            if range.end < added.start {
                merged.push(range);
            } else if range.start > added.end {
                if !inserted {
                    merged.push(added.clone());
                    inserted = true;
                }
                merged.push(range);
            } else {
                added.start = added.start.min(range.start);
                added.end = added.end.max(range.end);
            }
        }
        if !inserted {
            merged.push(added);
        }
        self.ranges = merged;
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Start of the `idx`-th range, `None` if there are not that many.
    pub fn start(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.start)
    }

    /// End of the `idx`-th range, `None` if there are not that many.
    pub fn end(&self, idx: usize) -> Option<f64> {
        self.ranges.get(idx).map(|r| r.end)
    }

    /// Returns the end of the chronologically last range, `None` if empty.
    pub fn last_end(&self) -> Option<f64> {
        self.ranges.last().map(|r| r.end)
    }
}
