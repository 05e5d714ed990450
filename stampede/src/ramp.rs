//! Ramp scheduling: chunked assignments and staggered worker starts.
//!
//! Generating a dataset copy is CPU-intensive, and a fleet of workers
//! that all begin generating (and then all open their connection pools)
//! at the same instant produces a correlated load spike at the target.
//! Two mitigations, both from the reference behavior: an oversized
//! dataset assignment is split into bounded chunks run sequentially by
//! the same worker, and each worker's very first chunk is delayed by its
//! index times a fixed interval.

use std::num::NonZeroU32;

use tokio::time::Duration;

/// Dataset copies one worker chunk may hold at once.
pub const DEFAULT_CHUNK_CEILING: NonZeroU32 = NonZeroU32::new(1_000).unwrap();

/// Delay between successive workers' first chunks.
pub const STAGGER_INTERVAL: Duration = Duration::from_secs(15);

/// Split `assigned` units into chunks of at most `ceiling`, preserving the
/// total. `None` means no ceiling: a single chunk. A zero assignment
/// yields no chunks.
#[must_use]
pub fn chunk_plan(assigned: u32, ceiling: Option<NonZeroU32>) -> Vec<u32> {
    if assigned == 0 {
        return Vec::new();
    }
    let Some(ceiling) = ceiling else {
        return vec![assigned];
    };
    let ceiling = ceiling.get();

    let mut chunks = Vec::with_capacity(assigned.div_ceil(ceiling) as usize);
    let mut left = assigned;
    while left > 0 {
        let size = left.min(ceiling);
        chunks.push(size);
        left -= size;
    }
    chunks
}

/// The delay before worker `index` starts its first chunk.
#[must_use]
pub fn stagger(index: usize) -> Duration {
    STAGGER_INTERVAL.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use tokio::time::Duration;

    use super::{chunk_plan, stagger};

    fn ceiling(n: u32) -> Option<NonZeroU32> {
        Some(NonZeroU32::new(n).expect("ceiling must be non-zero"))
    }

    #[test]
    fn oversized_assignment_is_chunked() {
        assert_eq!(chunk_plan(2_500, ceiling(1_000)), vec![1_000, 1_000, 500]);
    }

    #[test]
    fn assignment_at_ceiling_is_one_chunk() {
        assert_eq!(chunk_plan(1_000, ceiling(1_000)), vec![1_000]);
    }

    #[test]
    fn no_ceiling_is_one_chunk() {
        assert_eq!(chunk_plan(2_500, None), vec![2_500]);
    }

    #[test]
    fn zero_assignment_is_no_chunks() {
        assert_eq!(chunk_plan(0, ceiling(1_000)), Vec::<u32>::new());
    }

    #[test]
    fn chunks_preserve_total() {
        let chunks = chunk_plan(12_345, ceiling(1_000));
        assert_eq!(chunks.iter().sum::<u32>(), 12_345);
        assert!(chunks.iter().all(|c| *c <= 1_000));
    }

    #[test]
    fn stagger_is_indexed() {
        assert_eq!(stagger(0), Duration::ZERO);
        assert_eq!(stagger(1), Duration::from_secs(15));
        assert_eq!(stagger(4), Duration::from_secs(60));
    }
}
