// Cue registry - user and file designated seek targets

use std::collections::BTreeSet;

/// Sorted, de-duplicated set of cue ticks
///
/// Tick 0 is always present so "jump to the nearest cue" is defined even when
/// nothing was marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueRegistry {
    ticks: BTreeSet<u64>,
}

impl CueRegistry {
    /// Tick of the sentinel cue
    pub const SENTINEL: u64 = 0;

    pub fn new() -> Self {
        Self {
            ticks: BTreeSet::from([Self::SENTINEL]),
        }
    }

    /// Sentinel plus the given ticks
    pub fn reset_with(&mut self, ticks: impl IntoIterator<Item = u64>) {
        self.ticks.clear();
        self.ticks.insert(Self::SENTINEL);
        self.ticks.extend(ticks);
    }

    /// Returns false if the cue already existed
    pub fn add(&mut self, tick: u64) -> bool {
        self.ticks.insert(tick)
    }

    /// Remove an exact cue; the sentinel stays
    pub fn remove(&mut self, tick: u64) -> bool {
        tick != Self::SENTINEL && self.ticks.remove(&tick)
    }

    /// Remove the cue nearest to `tick` if it lies within `trash_delta` ticks
    ///
    /// Returns the removed tick. The sentinel is never a candidate.
    pub fn remove_near(&mut self, tick: u64, trash_delta: u64) -> Option<u64> {
        let nearest = self
            .ticks
            .iter()
            .copied()
            .filter(|&cue| cue != Self::SENTINEL)
            .min_by_key(|&cue| cue.abs_diff(tick))?;

        if nearest.abs_diff(tick) <= trash_delta {
            self.ticks.remove(&nearest);
            Some(nearest)
        } else {
            None
        }
    }

    pub fn contains(&self, tick: u64) -> bool {
        self.ticks.contains(&tick)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Only the sentinel is left
    pub fn is_empty(&self) -> bool {
        self.ticks.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ticks.iter().copied()
    }

    pub fn first(&self) -> u64 {
        self.ticks.first().copied().unwrap_or(Self::SENTINEL)
    }

    pub fn last(&self) -> u64 {
        self.ticks.last().copied().unwrap_or(Self::SENTINEL)
    }

    /// Greatest cue <= tick
    pub fn nearest_at_or_before(&self, tick: u64) -> u64 {
        self.ticks
            .range(..=tick)
            .next_back()
            .copied()
            .unwrap_or(Self::SENTINEL)
    }

    /// Smallest cue >= tick, wrapping to the first cue past the end
    pub fn nearest_at_or_after(&self, tick: u64) -> u64 {
        self.ticks
            .range(tick..)
            .next()
            .copied()
            .unwrap_or_else(|| self.first())
    }

    /// Smallest cue > tick, wrapping to the first cue past the end
    pub fn next_after(&self, tick: u64) -> u64 {
        match tick.checked_add(1) {
            Some(from) => self.nearest_at_or_after(from),
            None => self.first(),
        }
    }

    /// Greatest cue < tick, wrapping to the last cue before the start
    pub fn previous_before(&self, tick: u64) -> u64 {
        self.ticks
            .range(..tick)
            .next_back()
            .copied()
            .unwrap_or_else(|| self.last())
    }

    /// Walk `count` cues from `tick` (forward when positive)
    pub fn step(&self, tick: u64, count: i32) -> u64 {
        let mut position = tick;
        for _ in 0..count.unsigned_abs() {
            position = if count > 0 {
                self.next_after(position)
            } else {
                self.previous_before(position)
            };
        }
        position
    }
}

impl Default for CueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
