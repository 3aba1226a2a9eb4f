// Audio output - sinks fed by the render thread

pub mod device;
pub mod format_conversion;
pub mod sink;
pub mod status;
pub mod stream;

pub use sink::{AudioSink, NullSink, WavSink};
pub use stream::{CpalOutput, RingSink};
