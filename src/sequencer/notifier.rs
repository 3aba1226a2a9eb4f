// Transport notifier - position updates pushed out of the render loop
//
// Delivery never blocks the render thread: updates are either queued in a
// bounded ring (dropped when full) or overwrite the latest published value.

use super::timeline::TimeSignature;
use crate::messaging::channels::PositionProducer;
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Playhead position in musical terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionUpdate {
    pub absolute_tick: u64,
    /// 1-based
    pub measure: u64,
    /// 1-based beat inside the measure
    pub beat: u32,
    /// Metronome units elapsed since tick 0
    pub sub_beat: u64,
}

impl PositionUpdate {
    /// Compute the musical position of `tick` for the given meter
    pub fn at(tick: u64, resolution: u32, time_signature: TimeSignature, metronome_unit: u64) -> Self {
        let resolution = resolution.max(1) as u128;
        let numerator = time_signature.numerator.max(1) as u128;
        let denominator = time_signature.denominator.max(1) as u128;

        let quarters = tick as f64 / resolution as f64;
        let measure = 1 + (quarters / time_signature.quarter_notes_per_measure()).floor() as u64;
        // Widened so ticks near u64::MAX cannot overflow
        let beat = 1 + (tick as u128 * denominator / resolution / 4) % numerator;
        let sub_beat = tick / metronome_unit.max(1);

        Self {
            absolute_tick: tick,
            measure,
            beat: beat as u32,
            sub_beat,
        }
    }
}

/// Receiver of position updates
///
/// Called from the render thread and from transport commands; implementations
/// must return immediately.
pub trait TransportNotifier: Send + Sync {
    fn publish(&self, update: PositionUpdate);
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl TransportNotifier for NullNotifier {
    fn publish(&self, _update: PositionUpdate) {}
}

/// Bounded queue of updates for a UI thread to drain
pub struct RingNotifier {
    producer: Mutex<PositionProducer>,
    dropped: AtomicU64,
}

impl RingNotifier {
    pub fn new(producer: PositionProducer) -> Self {
        Self {
            producer: Mutex::new(producer),
            dropped: AtomicU64::new(0),
        }
    }

    /// Updates lost because the queue was full or busy
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TransportNotifier for RingNotifier {
    fn publish(&self, update: PositionUpdate) {
        let pushed = match self.producer.try_lock() {
            Ok(mut producer) => producer.try_push(update).is_ok(),
            Err(_) => false,
        };

        if !pushed {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                log::warn!("Position queue full, {} updates dropped so far", dropped);
            }
        }
    }
}

/// Overwrite-latest position, readable from any thread
#[derive(Clone, Default)]
pub struct LatestPosition {
    absolute_tick: Arc<AtomicU64>,
    measure: Arc<AtomicU64>,
    beat: Arc<AtomicU32>,
    sub_beat: Arc<AtomicU64>,
    version: Arc<AtomicU64>,
}

impl LatestPosition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published update
    /// Fields may come from two consecutive updates when read mid-publish
    pub fn get(&self) -> PositionUpdate {
        PositionUpdate {
            absolute_tick: self.absolute_tick.load(Ordering::Relaxed),
            measure: self.measure.load(Ordering::Relaxed),
            beat: self.beat.load(Ordering::Relaxed),
            sub_beat: self.sub_beat.load(Ordering::Relaxed),
        }
    }

    /// Number of updates published so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl TransportNotifier for LatestPosition {
    fn publish(&self, update: PositionUpdate) {
        self.absolute_tick.store(update.absolute_tick, Ordering::Relaxed);
        self.measure.store(update.measure, Ordering::Relaxed);
        self.beat.store(update.beat, Ordering::Relaxed);
        self.sub_beat.store(update.sub_beat, Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::Release);
    }
}
