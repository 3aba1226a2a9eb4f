// Sequencer engine - transport handle and render loop
//
// `SequencerEngine` is a cheap, cloneable handle used by the controlling
// thread(s). `Renderer` owns the synthesizer and the sink and runs on the
// render thread. Both sides share one `Core` behind a mutex; the lock is held
// to plan or commit a chunk and never while synthesizing or writing audio.
//
// Discontinuities (seek, load, backend failure) bump `Core::epoch`. A render
// step compares the epoch it planned with against the current one before every
// chunk and before dispatching, and abandons its plan when they differ.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ringbuf::traits::Producer;

use super::clock::ClockMapper;
use super::cues::CueRegistry;
use super::event::{Event, EventKind};
use super::notifier::{NullNotifier, PositionUpdate, TransportNotifier};
use super::timeline::{EventTimeline, Tempo};
use super::transport::{PlaybackState, TransportState};
use crate::audio::sink::AudioSink;
use crate::config::EngineConfig;
use crate::error::{BackendError, Result, SequencerError};
use crate::messaging::channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::synth::port::{OUTPUT_CHANNELS, SynthesisPort};

const RENDER_THREAD_NAME: &str = "cueplay-render";

/// Work the render thread must do before its next step
#[derive(Debug, Default, Clone, Copy)]
struct PendingActions {
    discard_audio: bool,
    soft_reset: bool,
    /// Epoch of the load whose priming pass has not run yet
    prime: Option<u64>,
}

impl PendingActions {
    fn any(&self) -> bool {
        self.discard_audio || self.soft_reset || self.prime.is_some()
    }
}

struct Core {
    config: EngineConfig,
    default_tempo: Tempo,
    timeline: Option<Arc<EventTimeline>>,
    playback: PlaybackState,
    clock: ClockMapper,
    cues: CueRegistry,
    stopped: bool,
    epoch: u64,
    pending: PendingActions,
    last_error: Option<String>,
}

impl Core {
    fn status(&self) -> TransportState {
        if self.stopped {
            TransportState::Stopped
        } else if self.timeline.is_none() {
            TransportState::Idle
        } else if self.playback.is_playing {
            TransportState::Playing
        } else {
            TransportState::Paused
        }
    }

    fn resolution(&self) -> u32 {
        self.timeline.as_ref().map_or(1, |timeline| timeline.resolution())
    }

    fn position_update(&self) -> PositionUpdate {
        self.playback.position(self.resolution())
    }

    /// Loaded timeline, or why there is none
    fn session(&self) -> Result<Arc<EventTimeline>> {
        if self.stopped {
            return Err(SequencerError::EngineStopped);
        }
        self.timeline.clone().ok_or(SequencerError::EmptySession)
    }

    /// Something for the render thread to do right now
    fn has_work(&self) -> bool {
        if self.stopped {
            return false;
        }
        if self.pending.any() {
            return true;
        }
        match &self.timeline {
            Some(_) => self.playback.is_playing,
            None => false,
        }
    }

    /// Move the playhead, negative targets clamp to 0; returns the tick reached
    ///
    /// A target past the last event leaves nothing to dispatch.
    fn seek_to(&mut self, timeline: &EventTimeline, target: i64) -> u64 {
        let tick = target.max(0) as u64;
        if target < 0 {
            log::warn!("Seek target {} clamped to 0", target);
        }

        self.playback.relocate(tick, timeline.events_from(tick));
        self.clock.reset();
        self.epoch += 1;
        self.pending.soft_reset = true;
        tick
    }
}

struct Shared {
    core: Mutex<Core>,
    wake: Condvar,
    notifier: Arc<dyn TransportNotifier>,
    notifications: Mutex<NotificationProducer>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notification: Notification) {
        let mut producer = self.notifications.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(dropped) = producer.try_push(notification) {
            log::warn!("Notification queue full, dropped: {}", dropped);
        }
    }

    /// End the session after a backend failure
    fn abort_session(&self, error: &BackendError) {
        let message = error.to_string();
        {
            let mut core = self.lock();
            core.timeline = None;
            core.playback.is_playing = false;
            core.pending = PendingActions::default();
            core.epoch += 1;
            core.last_error = Some(message.clone());
        }
        self.wake.notify_all();

        log::error!("Playback aborted: {}", message);
        let category = match error {
            BackendError::Synthesis(_) => NotificationCategory::Synthesis,
            _ => NotificationCategory::Audio,
        };
        self.notify(Notification::error(category, format!("Playback aborted: {}", message)));
    }
}

/// Handle to the sequencer; clones control the same engine
#[derive(Clone)]
pub struct SequencerEngine {
    shared: Arc<Shared>,
}

impl SequencerEngine {
    /// Engine without a position observer
    pub fn new(config: EngineConfig) -> Result<(Self, NotificationConsumer)> {
        Self::with_notifier(config, Arc::new(NullNotifier))
    }

    /// Engine publishing playhead positions to `notifier`
    ///
    /// Also returns the consumer half of the status channel.
    pub fn with_notifier(
        config: EngineConfig,
        notifier: Arc<dyn TransportNotifier>,
    ) -> Result<(Self, NotificationConsumer)> {
        config.validate()?;

        let default_tempo = Tempo::from_bpm(config.default_tempo_bpm)
            .ok_or_else(|| SequencerError::InvalidConfig("default tempo must be positive".to_string()))?;
        let (producer, consumer) = create_notification_channel(config.notification_capacity);

        let core = Core {
            default_tempo,
            timeline: None,
            playback: PlaybackState::new(default_tempo, 1),
            clock: ClockMapper::new(config.sample_rate, 1),
            cues: CueRegistry::new(),
            stopped: false,
            epoch: 0,
            pending: PendingActions::default(),
            last_error: None,
            config,
        };

        let engine = Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                wake: Condvar::new(),
                notifier,
                notifications: Mutex::new(producer),
                worker: Mutex::new(None),
            }),
        };
        Ok((engine, consumer))
    }

    pub fn config(&self) -> EngineConfig {
        self.shared.lock().config.clone()
    }

    /// Replace the timeline and rewind to tick 0, paused
    ///
    /// Queued audio is discarded, held notes are released and events before
    /// `priming_ticks` are dispatched by the render thread before any audio.
    pub fn load(&self, timeline: EventTimeline) -> Result<()> {
        let timeline = Arc::new(timeline);
        let (first_tick, last_tick) = timeline.time_range();
        let resolution = timeline.resolution();

        {
            let mut core = self.shared.lock();
            if core.stopped {
                return Err(SequencerError::EngineStopped);
            }

            core.playback = PlaybackState::new(core.default_tempo, resolution);
            core.clock = ClockMapper::new(core.config.sample_rate, resolution);
            core.cues.reset_with(timeline.cue_ticks());
            core.timeline = Some(Arc::clone(&timeline));
            core.epoch += 1;
            core.pending = PendingActions {
                discard_audio: true,
                soft_reset: true,
                prime: Some(core.epoch),
            };
            core.last_error = None;
            self.shared.notifier.publish(core.position_update());
        }
        self.shared.wake.notify_all();

        log::info!(
            "Loaded timeline: {} events, ticks {}..={}, resolution {}",
            timeline.len(),
            first_tick,
            last_tick,
            resolution
        );
        self.shared.notify(Notification::info(
            NotificationCategory::Timeline,
            format!("Loaded {} events", timeline.len()),
        ));
        Ok(())
    }

    /// Validate `events` and load them; prior state is kept on failure
    pub fn load_events(&self, events: Vec<Event>, resolution: u32) -> Result<()> {
        let timeline = EventTimeline::load(events, resolution)?;
        self.load(timeline)
    }

    pub fn play(&self) -> Result<()> {
        self.set_playing(true)
    }

    pub fn pause(&self) -> Result<()> {
        self.set_playing(false)
    }

    /// Flip between playing and paused; returns whether it now plays
    pub fn toggle_play(&self) -> Result<bool> {
        let playing = {
            let mut core = self.shared.lock();
            core.session()?;
            core.playback.is_playing = !core.playback.is_playing;
            core.playback.is_playing
        };
        self.shared.wake.notify_all();
        log::info!("Transport {}", if playing { "playing" } else { "paused" });
        Ok(playing)
    }

    fn set_playing(&self, playing: bool) -> Result<()> {
        {
            let mut core = self.shared.lock();
            core.session()?;
            core.playback.is_playing = playing;
        }
        self.shared.wake.notify_all();
        log::info!("Transport {}", if playing { "playing" } else { "paused" });
        Ok(())
    }

    /// Move the playhead to `target` (negative targets clamp to 0)
    ///
    /// Events before the target are not replayed; sounding notes are released.
    pub fn seek(&self, target: i64) -> Result<u64> {
        let tick = {
            let mut core = self.shared.lock();
            let timeline = core.session()?;
            let tick = core.seek_to(&timeline, target);
            self.shared.notifier.publish(core.position_update());
            tick
        };
        self.shared.wake.notify_all();
        log::info!("Seek to tick {}", tick);
        Ok(tick)
    }

    /// Jump `count` cues forward (or backward when negative), wrapping around
    pub fn skip_by_cue_count(&self, count: i32) -> Result<u64> {
        let tick = {
            let mut core = self.shared.lock();
            let timeline = core.session()?;
            let target = core.cues.step(core.playback.current_tick, count);
            let tick = core.seek_to(&timeline, target as i64);
            self.shared.notifier.publish(core.position_update());
            tick
        };
        self.shared.wake.notify_all();
        log::info!("Skipped {} cue(s) to tick {}", count, tick);
        Ok(tick)
    }

    /// Returns false when a cue already sits at `tick`
    pub fn add_cue(&self, tick: u64) -> bool {
        self.shared.lock().cues.add(tick)
    }

    /// Place a cue at the playhead
    pub fn mark_cue(&self) -> Result<u64> {
        let mut core = self.shared.lock();
        core.session()?;
        let tick = core.playback.current_tick;
        core.cues.add(tick);
        Ok(tick)
    }

    /// Remove the cue nearest to `tick` within `cue_trash_delta`
    pub fn remove_cue_near(&self, tick: u64) -> Option<u64> {
        let mut core = self.shared.lock();
        let trash_delta = core.config.cue_trash_delta;
        core.cues.remove_near(tick, trash_delta)
    }

    /// Cue ticks in ascending order, sentinel included
    pub fn cues(&self) -> Vec<u64> {
        self.shared.lock().cues.iter().collect()
    }

    pub fn status(&self) -> TransportState {
        self.shared.lock().status()
    }

    pub fn position(&self) -> Result<PositionUpdate> {
        let core = self.shared.lock();
        core.session()?;
        Ok(core.position_update())
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.lock().playback
    }

    /// First and last tick of the loaded timeline
    pub fn time_range(&self) -> Result<(u64, u64)> {
        let core = self.shared.lock();
        core.timeline
            .as_ref()
            .map(|timeline| timeline.time_range())
            .ok_or(SequencerError::EmptyTimeline)
    }

    /// Like `time_range`, falling back to `(0, 1)` without a timeline
    pub fn progress_range(&self) -> (u64, u64) {
        self.time_range().unwrap_or((0, 1))
    }

    /// Message of the backend failure that ended the last session
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Renderer driving `synth` and `sink` from the calling thread
    pub fn renderer<S, A>(&self, synth: S, sink: A) -> Renderer<S, A>
    where
        S: SynthesisPort,
        A: AudioSink,
    {
        Renderer {
            shared: Arc::clone(&self.shared),
            synth,
            sink,
            buffer: Vec::new(),
        }
    }

    /// Spawn the render thread; it owns `synth` and `sink` until it exits
    pub fn start<S, A>(&self, synth: S, sink: A) -> Result<()>
    where
        S: SynthesisPort + 'static,
        A: AudioSink + 'static,
    {
        if self.shared.lock().stopped {
            return Err(SequencerError::EngineStopped);
        }

        let mut worker = self.shared.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SequencerError::AlreadyRunning);
        }

        let renderer = self.renderer(synth, sink);
        let handle = thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || renderer.run())
            .map_err(BackendError::from)?;

        *worker = Some(handle);
        log::info!("Render thread started");
        Ok(())
    }

    /// Stop for good: wake and join the render thread
    ///
    /// The render thread drains the sink before it exits.
    pub fn stop(&self) {
        {
            let mut core = self.shared.lock();
            core.stopped = true;
            core.playback.is_playing = false;
        }
        self.shared.wake.notify_all();

        let handle = self.shared.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a backend on the render thread; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
        log::info!("Engine stopped");
    }
}

/// What a single `render_step` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Rendered up to the event at `index` and dispatched it
    Dispatched { index: usize, tick: u64, frames: u64 },
    /// Paused, seeked or reloaded before the due event was reached
    Aborted { frames: u64 },
    /// Nothing due: no timeline, paused or stopped
    Idle,
    /// The last event has been dispatched; playback paused
    Finished,
}

/// Plan of a render step, taken under the lock
struct StepPlan {
    epoch: u64,
    index: usize,
    target_tick: u64,
}

/// Render side of the engine; owns the backends
pub struct Renderer<S: SynthesisPort, A: AudioSink> {
    shared: Arc<Shared>,
    synth: S,
    sink: A,
    buffer: Vec<f32>,
}

impl<S: SynthesisPort, A: AudioSink> Renderer<S, A> {
    pub fn synth(&self) -> &S {
        &self.synth
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    /// Hand the backends back
    pub fn into_parts(self) -> (S, A) {
        (self.synth, self.sink)
    }

    /// Render audio up to the next due event and dispatch it
    ///
    /// Once the last event has been dispatched the step returns `Finished`
    /// and pauses playback; `play()` after that finishes again at once until a
    /// seek or load moves the playhead.
    /// A backend failure ends the session and is returned.
    pub fn render_step(&mut self) -> Result<StepOutcome> {
        match self.try_render_step() {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.shared.abort_session(&error);
                Err(SequencerError::Backend(error))
            }
        }
    }

    fn try_render_step(&mut self) -> std::result::Result<StepOutcome, BackendError> {
        self.apply_pending()?;
        let shared = Arc::clone(&self.shared);

        let plan = {
            let mut core = shared.lock();
            if core.stopped || !core.playback.is_playing || core.pending.any() {
                return Ok(StepOutcome::Idle);
            }
            let Some(timeline) = core.timeline.clone() else {
                return Ok(StepOutcome::Idle);
            };

            let index = core.playback.next_event_index;
            let Some(event) = timeline.get(index) else {
                core.playback.is_playing = false;
                drop(core);
                log::info!("End of timeline reached");
                shared.notify(Notification::info(
                    NotificationCategory::Transport,
                    "End of timeline".to_string(),
                ));
                return Ok(StepOutcome::Finished);
            };

            log::debug!(
                "Plan: event {} at tick {} ({} ticks ahead)",
                index,
                event.tick,
                event.tick.saturating_sub(core.playback.current_tick)
            );
            StepPlan {
                epoch: core.epoch,
                index,
                target_tick: event.tick,
            }
        };

        let mut frames_rendered = 0u64;
        let mut written_update: Option<PositionUpdate> = None;

        loop {
            let mut core = shared.lock();
            if core.epoch != plan.epoch {
                return Ok(StepOutcome::Aborted { frames: frames_rendered });
            }
            if let Some(update) = written_update.take() {
                shared.notifier.publish(update);
            }
            if !core.playback.is_playing {
                return Ok(StepOutcome::Aborted { frames: frames_rendered });
            }

            let remaining = plan.target_tick.saturating_sub(core.playback.current_tick);
            if remaining == 0 {
                return self.dispatch_planned(core, &plan, frames_rendered);
            }

            let chunk = remaining.min(core.config.max_chunk_ticks);
            let bpm = core.playback.tempo.bpm();
            core.playback.current_tick += chunk;
            let frames = core.clock.chunk_samples(chunk, bpm);
            let update = core.position_update();
            drop(core);

            if frames > 0 {
                self.render_chunk(frames as usize)?;
            }
            frames_rendered += frames;
            written_update = Some(update);
        }
    }

    fn render_chunk(&mut self, frames: usize) -> std::result::Result<(), BackendError> {
        self.buffer.clear();
        self.buffer.resize(frames * OUTPUT_CHANNELS, 0.0);
        self.synth.render_samples(frames, &mut self.buffer)?;
        self.sink.write(&self.buffer)
    }

    fn dispatch_planned(
        &mut self,
        mut core: MutexGuard<'_, Core>,
        plan: &StepPlan,
        frames: u64,
    ) -> std::result::Result<StepOutcome, BackendError> {
        let Some(event) = core.timeline.as_ref().and_then(|timeline| timeline.get(plan.index).copied()) else {
            return Ok(StepOutcome::Aborted { frames });
        };

        let resolution = core.resolution();
        core.playback.next_event_index = plan.index + 1;
        core.playback.apply(&event, resolution);
        let update = core.position_update();
        drop(core);

        log::debug!("Dispatch {:?} on channel {} at tick {}", event.kind, event.channel, event.tick);
        dispatch_event(&mut self.synth, &event)?;
        self.shared.notifier.publish(update);

        Ok(StepOutcome::Dispatched {
            index: plan.index,
            tick: event.tick,
            frames,
        })
    }

    /// Run the actions queued by load and seek
    fn apply_pending(&mut self) -> std::result::Result<(), BackendError> {
        let (pending, primed) = {
            let mut core = self.shared.lock();
            let pending = std::mem::take(&mut core.pending);
            let primed = match (pending.prime, core.timeline.clone()) {
                (Some(load_epoch), Some(timeline)) => {
                    let end = timeline.events_from(core.config.priming_ticks);
                    let seeked = load_epoch != core.epoch;
                    // After a seek only the events behind the playhead count as
                    // primed, and their notes stay silent
                    let primed_end = if seeked {
                        end.min(core.playback.next_event_index)
                    } else {
                        end
                    };
                    let primed: Vec<Event> = timeline.events()[..primed_end]
                        .iter()
                        .filter(|event| !(seeked && is_note(event)))
                        .copied()
                        .collect();

                    let resolution = timeline.resolution();
                    for event in &primed {
                        core.playback.apply(event, resolution);
                    }
                    if !seeked {
                        core.playback.next_event_index = core.playback.next_event_index.max(end);
                    }
                    primed
                }
                _ => Vec::new(),
            };
            (pending, primed)
        };

        if pending.discard_audio {
            self.sink.discard();
        }
        if pending.soft_reset {
            self.synth.soft_reset()?;
        }
        if !primed.is_empty() {
            log::debug!("Priming {} event(s)", primed.len());
        }
        for event in &primed {
            dispatch_event(&mut self.synth, event)?;
        }
        Ok(())
    }

    /// Render until stopped or a backend fails, then drain the sink
    pub fn run(mut self) {
        loop {
            match self.render_step() {
                Ok(StepOutcome::Dispatched { .. }) | Ok(StepOutcome::Aborted { .. }) => {}
                Ok(StepOutcome::Idle) | Ok(StepOutcome::Finished) => {
                    if !self.wait_for_work() {
                        break;
                    }
                }
                Err(_) => break,
            }
            if self.shared.lock().stopped {
                break;
            }
        }

        if let Err(e) = self.sink.drain() {
            log::warn!("Failed to drain audio sink: {}", e);
            self.shared.notify(Notification::warning(
                NotificationCategory::Audio,
                format!("Audio not fully played on shutdown: {}", e),
            ));
        }
        log::info!("Render thread exiting");
    }

    /// Block until there is work or the engine stops; false once stopped
    fn wait_for_work(&self) -> bool {
        let mut core = self.shared.lock();
        let timeout = Duration::from_millis(core.config.idle_wait_ms.max(1));
        while !core.stopped && !core.has_work() {
            let (guard, _) = self
                .shared
                .wake
                .wait_timeout(core, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            core = guard;
        }
        !core.stopped
    }
}

fn is_note(event: &Event) -> bool {
    matches!(event.kind, EventKind::NoteOn { .. } | EventKind::NoteOff { .. })
}

/// Forward a channel event to the synthesizer
fn dispatch_event<S: SynthesisPort + ?Sized>(synth: &mut S, event: &Event) -> std::result::Result<(), BackendError> {
    let channel = event.channel;
    match event.kind {
        EventKind::NoteOn { note, velocity } => synth.note_on(channel, note, velocity),
        EventKind::NoteOff { note } => synth.note_off(channel, note),
        EventKind::ProgramChange { program } => synth.select_program(channel, program),
        EventKind::ControlChange { controller, value } => synth.control_change(channel, controller, value),
        // Applied to the playback state under the lock
        EventKind::SetTempo { .. } | EventKind::TimeSignature { .. } => Ok(()),
        EventKind::CueMarker => Ok(()),
    }
}
