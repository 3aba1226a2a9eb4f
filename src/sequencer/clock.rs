// Clock mapping - tick <-> sample <-> seconds conversion
//
// samples = sample_rate * ticks / resolution * 60 / bpm
//
// Everything here is pure: the tempo passed in is the tempo in force for the
// span being converted, so a tempo change only affects spans converted after it.

/// Frames needed to cover `delta_ticks` at a constant tempo, rounded to nearest
pub fn samples_for_tick_delta(delta_ticks: u64, resolution: u32, tempo_bpm: f64, sample_rate: u32) -> u64 {
    exact_samples(delta_ticks, resolution, tempo_bpm, sample_rate).round() as u64
}

/// Unrounded frame count for a tick span
pub fn exact_samples(delta_ticks: u64, resolution: u32, tempo_bpm: f64, sample_rate: u32) -> f64 {
    sample_rate as f64 * delta_ticks as f64 / resolution as f64 * 60.0 / tempo_bpm
}

/// Ticks elapsed while `samples` frames play at a constant tempo (floored)
pub fn ticks_for_samples(samples: u64, resolution: u32, tempo_bpm: f64, sample_rate: u32) -> u64 {
    (samples as f64 * resolution as f64 * tempo_bpm / 60.0 / sample_rate as f64).floor() as u64
}

/// Wall-clock length of a tick span at a constant tempo
pub fn ticks_to_seconds(ticks: u64, resolution: u32, tempo_bpm: f64) -> f64 {
    ticks as f64 / resolution as f64 * 60.0 / tempo_bpm
}

/// Format seconds as `m:ss.mmm` for cue lists
pub fn format_clock(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let minutes = total_millis / 60_000;
    let secs = (total_millis / 1000) % 60;
    let millis = total_millis % 1000;
    format!("{}:{:02}.{:03}", minutes, secs, millis)
}

/// Converts chunk after chunk while carrying the rounding remainder
///
/// Summing the frames of consecutive chunks at one tempo gives the same total
/// as converting the whole span at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockMapper {
    sample_rate: u32,
    resolution: u32,
    carry: f64,
}

impl ClockMapper {
    pub fn new(sample_rate: u32, resolution: u32) -> Self {
        Self {
            sample_rate,
            resolution,
            carry: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Frames for the next chunk of `ticks` at `tempo_bpm`
    pub fn chunk_samples(&mut self, ticks: u64, tempo_bpm: f64) -> u64 {
        let exact = exact_samples(ticks, self.resolution, tempo_bpm, self.sample_rate) + self.carry;
        let frames = exact.round().max(0.0);
        self.carry = exact - frames;
        frames as u64
    }

    /// Forget the remainder (after a seek or load)
    pub fn reset(&mut self) {
        self.carry = 0.0;
    }

    pub fn ticks_to_seconds(&self, ticks: u64, tempo_bpm: f64) -> f64 {
        ticks_to_seconds(ticks, self.resolution, tempo_bpm)
    }
}
