// Lock-free communication channels

use crate::messaging::notification::Notification;
use crate::sequencer::notifier::PositionUpdate;
use ringbuf::{HeapRb, traits::Split};

pub type PositionProducer = ringbuf::HeapProd<PositionUpdate>;
pub type PositionConsumer = ringbuf::HeapCons<PositionUpdate>;

/// Bounded queue of playhead positions (render thread -> UI)
pub fn create_position_channel(capacity: usize) -> (PositionProducer, PositionConsumer) {
    let rb = HeapRb::<PositionUpdate>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

/// Bounded queue of engine status notifications (engine -> caller)
pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

pub type SampleProducer = ringbuf::HeapProd<f32>;
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Interleaved stereo samples (render thread -> audio device callback)
pub fn create_sample_channel(capacity_frames: usize) -> (SampleProducer, SampleConsumer) {
    let rb = HeapRb::<f32>::new(capacity_frames * 2);
    rb.split()
}
