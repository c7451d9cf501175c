//! Index sources for oracle assignment and status requests
//!
//! Known weakness: every source here is local to the node running the
//! ledger. Participants cannot predict [`OsIndexSource`] draws, but they also
//! cannot verify them, and the node operator could bias them. A verifiable
//! random function or an external randomness beacon is required before
//! oracles are mutually untrusted in production. Only the index-triple and
//! quorum contract depends on this module, not the source itself.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of indexes in `0..range`
pub trait IndexSource: Send {
    /// Draw one index in `0..range` (`range` is never zero)
    fn next_index(&mut self, range: u8) -> u8;
}

/// Operating-system seeded CSPRNG
#[derive(Debug)]
pub struct OsIndexSource {
    rng: StdRng,
}

impl OsIndexSource {
    /// Create a source seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for OsIndexSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexSource for OsIndexSource {
    fn next_index(&mut self, range: u8) -> u8 {
        self.rng.gen_range(0..range)
    }
}

/// Deterministic source for replays and simulations
#[derive(Debug)]
pub struct SeededIndexSource {
    rng: StdRng,
}

impl SeededIndexSource {
    /// Create a source from a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IndexSource for SeededIndexSource {
    fn next_index(&mut self, range: u8) -> u8 {
        self.rng.gen_range(0..range)
    }
}

/// Plays back a fixed script of indexes, then counts upward
#[derive(Debug, Default)]
pub struct ScriptedIndexSource {
    script: VecDeque<u8>,
    fallback: u8,
}

impl ScriptedIndexSource {
    /// Create a source that yields `script` in order
    pub fn new(script: impl IntoIterator<Item = u8>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: 0,
        }
    }

    /// Append more indexes to the script
    pub fn push(&mut self, indexes: impl IntoIterator<Item = u8>) {
        self.script.extend(indexes);
    }
}

impl IndexSource for ScriptedIndexSource {
    fn next_index(&mut self, range: u8) -> u8 {
        match self.script.pop_front() {
            Some(index) => index % range,
            None => {
                let index = self.fallback % range;
                self.fallback = self.fallback.wrapping_add(1);
                index
            }
        }
    }
}

/// Draw three distinct indexes in `0..range` (`range` must be at least 3)
pub fn draw_index_triple(source: &mut dyn IndexSource, range: u8) -> [u8; 3] {
    let first = source.next_index(range);

    let mut second = source.next_index(range);
    while second == first {
        second = source.next_index(range);
    }

    let mut third = source.next_index(range);
    while third == first || third == second {
        third = source.next_index(range);
    }

    [first, second, third]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_is_distinct_and_in_range() {
        let mut source = SeededIndexSource::new(7);
        for _ in 0..200 {
            let [a, b, c] = draw_index_triple(&mut source, 10);
            assert!(a < 10 && b < 10 && c < 10);
            assert!(a != b && b != c && a != c);
        }
    }

    #[test]
    fn test_scripted_source_skips_repeats() {
        let mut source = ScriptedIndexSource::new([4, 4, 4, 5, 4, 5, 6]);
        assert_eq!(draw_index_triple(&mut source, 10), [4, 5, 6]);
    }

    #[test]
    fn test_scripted_source_fallback_terminates() {
        let mut source = ScriptedIndexSource::new([]);
        assert_eq!(draw_index_triple(&mut source, 3), [0, 1, 2]);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut a = SeededIndexSource::new(42);
        let mut b = SeededIndexSource::new(42);
        let draws_a: Vec<u8> = (0..16).map(|_| a.next_index(10)).collect();
        let draws_b: Vec<u8> = (0..16).map(|_| b.next_index(10)).collect();
        assert_eq!(draws_a, draws_b);
    }
}
