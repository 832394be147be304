use std::cmp::Ordering;

use crate::manifest::Representation;

/// Ordering key for representations: resolution first, then bandwidth.
pub fn quality(representation: &Representation) -> impl Ord {
    QualityKey {
        width: representation.width,
        height: representation.height,
        bandwidth: representation.bandwidth,
    }
}

/// Representations sorted from lowest to highest quality.
pub fn quality_ladder(representations: &[Representation]) -> Vec<Representation> {
    let mut ladder = representations.to_vec();
    ladder.sort_by_cached_key(|r| quality(r));
    ladder
}

#[derive(PartialEq, Eq)]
struct QualityKey {
    width: Option<u64>,
    height: Option<u64>,
    bandwidth: Option<u64>,
}

impl PartialOrd for QualityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.width
            .cmp(&other.width)
            .then(self.height.cmp(&other.height))
            .then(self.bandwidth.cmp(&other.bandwidth))
    }
}
