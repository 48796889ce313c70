//! Contiguous chunk partitioning of the leaf set
//!
//! Leaves are split into `chunk_count` half-open ranges `[start, end)` of
//! size `ceil(len / chunk_count)`, the last one possibly shorter. Chunks
//! preserve leaf order; with more chunks requested than leaves, each leaf
//! gets its own chunk and no chunk is empty.

#![forbid(unsafe_code)]

use std::ops::Range;

/// Index of a chunk `c ∈ {0..C-1}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkIdx(pub usize);

impl ChunkIdx {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Chunk size for splitting `len` items into at most `chunk_count` chunks.
#[inline]
pub fn chunk_size(len: usize, chunk_count: usize) -> usize {
    let c = chunk_count.max(1);
    ((len + c - 1) / c).max(1)
}

/// Number of chunks of size `size` needed to cover `len` items.
#[inline]
pub fn chunk_count(len: usize, size: usize) -> usize {
    let size = size.max(1);
    (len + size - 1) / size
}

/// Half-open bounds of chunk `c`.
#[inline]
pub fn chunk_bounds(c: ChunkIdx, len: usize, size: usize) -> Range<usize> {
    let size = size.max(1);
    let start = (c.0 * size).min(len);
    let end = ((c.0 + 1) * size).min(len);
    start..end
}

/// Partition `len` items into at most `requested` contiguous chunks.
pub fn chunks(len: usize, requested: usize) -> impl Iterator<Item = (ChunkIdx, Range<usize>)> {
    let size = chunk_size(len, requested);
    (0..chunk_count(len, size)).map(move |c| {
        let idx = ChunkIdx(c);
        (idx, chunk_bounds(idx, len, size))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_item_once_in_order() {
        for len in [0usize, 1, 2, 7, 16, 33] {
            for requested in [1usize, 2, 3, 8, 64] {
                let ranges: Vec<_> = chunks(len, requested).map(|(_, r)| r).collect();
                assert!(ranges.len() <= requested.max(1));
                assert!(ranges.iter().all(|r| !r.is_empty()));
                let flat: Vec<usize> = ranges.into_iter().flatten().collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn ceil_sized_chunks() {
        let v: Vec<_> = chunks(10, 4).collect();
        assert_eq!(
            v,
            vec![
                (ChunkIdx(0), 0..3),
                (ChunkIdx(1), 3..6),
                (ChunkIdx(2), 6..9),
                (ChunkIdx(3), 9..10)
            ]
        );
        assert_eq!(chunk_size(10, 0), 10);
    }
}
