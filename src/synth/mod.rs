// Synthesis backend contract

pub mod port;

pub use port::{SilentSynth, SynthesisPort};
