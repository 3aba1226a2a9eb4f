//! End-to-end playback scenarios driven step by step through a `Renderer`

mod common;

use common::{RecordingSink, RecordingSynth, SynthCall, calls, count};
use cueplay::audio::sink::NullSink;
use cueplay::config::EngineConfig;
use cueplay::error::{BackendError, SequencerError};
use cueplay::messaging::notification::NotificationLevel;
use cueplay::sequencer::engine::{SequencerEngine, StepOutcome};
use cueplay::sequencer::event::Event;
use cueplay::sequencer::notifier::{LatestPosition, RingNotifier};
use cueplay::sequencer::timeline::EventTimeline;
use cueplay::sequencer::transport::TransportState;
use cueplay::synth::port::SilentSynth;
use cueplay::messaging::channels::create_position_channel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn engine() -> SequencerEngine {
    SequencerEngine::new(EngineConfig::default()).unwrap().0
}

/// One quarter note at 120 BPM, resolution 480
fn quarter_note() -> Vec<Event> {
    vec![
        Event::set_tempo(0, 500_000),
        Event::note_on(480, 0, 60, 100),
        Event::note_off(960, 0, 60),
    ]
}

#[test]
fn test_quarter_note_renders_half_a_second() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();
    engine.play().unwrap();

    let (synth, log) = RecordingSynth::new();
    let (sink, stats) = RecordingSink::new();
    let mut renderer = engine.renderer(synth, sink);

    assert_eq!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 1, tick: 480, frames: 22050 }
    );
    assert_eq!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 2, tick: 960, frames: 22050 }
    );
    assert_eq!(renderer.render_step().unwrap(), StepOutcome::Finished);

    let note_ons: Vec<_> = calls(&log)
        .into_iter()
        .filter(|(_, call)| matches!(call, SynthCall::NoteOn { .. }))
        .collect();
    let note_offs: Vec<_> = calls(&log)
        .into_iter()
        .filter(|(_, call)| matches!(call, SynthCall::NoteOff { .. }))
        .collect();

    assert_eq!(note_ons, vec![(22050, SynthCall::NoteOn { channel: 0, note: 60, velocity: 100 })]);
    assert_eq!(note_offs, vec![(44100, SynthCall::NoteOff { channel: 0, note: 60 })]);
    assert_eq!(note_offs[0].0 - note_ons[0].0, 22050);

    // 96 chunks of 5 ticks per quarter note
    assert_eq!(stats.lock().unwrap().writes, 192);
    assert_eq!(stats.lock().unwrap().frames, 44100);
}

#[test]
fn test_tempo_change_applies_from_next_chunk() {
    let engine = engine();
    engine
        .load_events(
            vec![
                Event::set_tempo(0, 1_000_000),
                Event::note_on(480, 0, 60, 100),
                Event::set_tempo(480, 500_000),
                Event::note_off(960, 0, 60),
            ],
            480,
        )
        .unwrap();
    engine.play().unwrap();

    let mut renderer = engine.renderer(SilentSynth, NullSink::new());

    // 60 BPM until tick 480
    assert_eq!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 1, tick: 480, frames: 44100 }
    );
    assert_eq!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 2, tick: 480, frames: 0 }
    );
    assert!((engine.playback_state().tempo.bpm() - 120.0).abs() < 1e-9);
    assert_eq!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 3, tick: 960, frames: 22050 }
    );
}

#[test]
fn test_pause_mid_delta_aborts_step() {
    let engine = engine();
    engine
        .load_events(vec![Event::program_change(0, 0, 1), Event::note_on(100, 0, 64, 90)], 480)
        .unwrap();
    engine.play().unwrap();

    let pausing = engine.clone();
    let (sink, _stats) = RecordingSink::with_hook(move |write| {
        if write == 1 {
            pausing.pause().unwrap();
        }
    });
    let (synth, log) = RecordingSynth::new();
    let mut renderer = engine.renderer(synth, sink);

    assert!(matches!(renderer.render_step().unwrap(), StepOutcome::Aborted { .. }));

    let state = engine.playback_state();
    assert!(state.current_tick > 0 && state.current_tick < 100);
    assert!(!state.is_playing);
    assert_eq!(state.next_event_index, 1);
    assert_eq!(count(&log, |call| matches!(call, SynthCall::NoteOn { .. })), 0);

    // Resuming picks the same event up again
    engine.play().unwrap();
    assert!(matches!(
        renderer.render_step().unwrap(),
        StepOutcome::Dispatched { index: 1, tick: 100, .. }
    ));
    assert_eq!(count(&log, |call| matches!(call, SynthCall::NoteOn { .. })), 1);
}

#[test]
fn test_seek_twice_equals_seek_once() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();

    assert_eq!(engine.seek(700).unwrap(), 700);
    let once = engine.playback_state();
    let position = engine.position().unwrap();

    assert_eq!(engine.seek(700).unwrap(), 700);
    assert_eq!(engine.playback_state(), once);
    assert_eq!(engine.position().unwrap(), position);
    assert_eq!(once.next_event_index, 2);
}

#[test]
fn test_random_commands_keep_dispatch_order() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let events: Vec<Event> = (0..60)
        .map(|i| {
            let tick = rng.gen_range(0..4_000);
            if i % 2 == 0 {
                Event::note_on(tick, (i % 16) as u8, 60, 100)
            } else {
                Event::note_off(tick, (i % 16) as u8, 60)
            }
        })
        .collect();

    let timeline = EventTimeline::load(events, 96).unwrap();
    let sorted = timeline.events().to_vec();
    let (_, last_tick) = timeline.time_range();

    let engine = engine();
    engine.load(timeline).unwrap();
    engine.play().unwrap();
    let mut renderer = engine.renderer(SilentSynth, NullSink::new());

    for _ in 0..300 {
        match rng.gen_range(0..10) {
            0..=1 => {
                engine.seek(rng.gen_range(-200..last_tick as i64 + 200)).unwrap();
            }
            2 => {
                engine.toggle_play().unwrap();
            }
            _ => {
                renderer.render_step().unwrap();
            }
        }

        let state = engine.playback_state();
        assert!(state.next_event_index <= sorted.len());
        assert!(
            sorted[state.next_event_index..]
                .iter()
                .all(|event| event.tick >= state.current_tick),
            "event behind the playhead left undispatched at tick {}",
            state.current_tick
        );
    }
}

#[test]
fn test_skip_wraps_past_last_cue() {
    let engine = engine();
    engine
        .load_events(
            vec![
                Event::note_on(0, 0, 60, 100),
                Event::cue_marker(500),
                Event::cue_marker(1000),
                Event::note_off(1200, 0, 60),
            ],
            480,
        )
        .unwrap();
    assert_eq!(engine.cues(), vec![0, 500, 1000]);

    engine.seek(1000).unwrap();
    assert_eq!(engine.skip_by_cue_count(1).unwrap(), 0);
    assert_eq!(engine.playback_state().current_tick, 0);

    assert_eq!(engine.skip_by_cue_count(-1).unwrap(), 1000);
    assert_eq!(engine.skip_by_cue_count(-2).unwrap(), 0);
    assert_eq!(engine.skip_by_cue_count(2).unwrap(), 1000);

    // Between cues
    engine.seek(700).unwrap();
    assert_eq!(engine.skip_by_cue_count(-1).unwrap(), 500);
}

#[test]
fn test_skip_wraps_from_cue_past_end() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();
    assert_eq!(engine.time_range().unwrap(), (0, 960));
    assert!(engine.add_cue(2000));

    assert_eq!(engine.skip_by_cue_count(1).unwrap(), 2000);
    assert_eq!(engine.playback_state().current_tick, 2000);
    assert_eq!(engine.skip_by_cue_count(1).unwrap(), 0);
    assert_eq!(engine.skip_by_cue_count(-1).unwrap(), 2000);
}

#[test]
fn test_seek_past_end_finishes_without_dispatch() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();
    assert_eq!(engine.seek(5000).unwrap(), 5000);
    engine.play().unwrap();

    let (synth, log) = RecordingSynth::new();
    let mut renderer = engine.renderer(synth, NullSink::new());
    assert_eq!(renderer.render_step().unwrap(), StepOutcome::Finished);

    assert_eq!(count(&log, |call| matches!(call, SynthCall::NoteOn { .. } | SynthCall::NoteOff { .. })), 0);
    assert!(!engine.playback_state().is_playing);
}

#[test]
fn test_user_cues_reset_on_load() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();
    assert!(engine.add_cue(300));
    assert!(!engine.add_cue(300));
    assert_eq!(engine.cues(), vec![0, 300]);

    engine.load_events(quarter_note(), 480).unwrap();
    assert_eq!(engine.cues(), vec![0]);
}

#[test]
fn test_time_range_after_load() {
    let mut rng = StdRng::seed_from_u64(7);
    let engine = engine();

    for _ in 0..20 {
        let ticks: Vec<u64> = (0..rng.gen_range(1..40)).map(|_| rng.gen_range(0..100_000)).collect();
        let events = ticks.iter().map(|&tick| Event::control_change(tick, 0, 7, 100)).collect();
        engine.load_events(events, 96).unwrap();

        let expected = (*ticks.iter().min().unwrap(), *ticks.iter().max().unwrap());
        assert_eq!(engine.time_range().unwrap(), expected);
        assert_eq!(engine.progress_range(), expected);
    }
}

#[test]
fn test_malformed_load_keeps_session() {
    let engine = engine();
    engine.load_events(quarter_note(), 480).unwrap();
    engine.seek(600).unwrap();
    let before = engine.playback_state();

    assert!(matches!(
        engine.load_events(Vec::new(), 480),
        Err(SequencerError::MalformedTimeline(_))
    ));
    assert!(matches!(
        engine.load_events(quarter_note(), 0),
        Err(SequencerError::MalformedTimeline(_))
    ));
    assert!(matches!(
        engine.load_events(vec![Event::note_on(0, 16, 60, 100)], 480),
        Err(SequencerError::MalformedTimeline(_))
    ));

    assert_eq!(engine.playback_state(), before);
    assert_eq!(engine.time_range().unwrap(), (0, 960));
}

#[test]
fn test_backend_failure_ends_session() {
    let (engine, mut notifications) = SequencerEngine::new(EngineConfig::default()).unwrap();
    engine.load_events(quarter_note(), 480).unwrap();
    engine.play().unwrap();

    let (synth, _log) = RecordingSynth::failing_on_note_on(1);
    let mut renderer = engine.renderer(synth, NullSink::new());

    assert!(matches!(
        renderer.render_step(),
        Err(SequencerError::Backend(BackendError::Synthesis(_)))
    ));
    assert_eq!(engine.status(), TransportState::Idle);
    assert!(engine.last_error().unwrap().contains("voice allocation failed"));
    assert!(matches!(engine.time_range(), Err(SequencerError::EmptyTimeline)));

    let mut levels = Vec::new();
    while let Some(notification) = notifications.try_pop() {
        levels.push(notification.level);
    }
    assert_eq!(levels, vec![NotificationLevel::Info, NotificationLevel::Error]);

    // Nothing left to render
    assert_eq!(renderer.render_step().unwrap(), StepOutcome::Idle);

    // A new load starts a fresh session
    engine.load_events(quarter_note(), 480).unwrap();
    assert_eq!(engine.status(), TransportState::Paused);
    assert_eq!(engine.last_error(), None);
}

#[test]
fn test_load_discards_audio_and_releases_notes() {
    let engine = engine();
    let (synth, log) = RecordingSynth::new();
    let (sink, stats) = RecordingSink::new();
    let mut renderer = engine.renderer(synth, sink);

    engine.load_events(quarter_note(), 480).unwrap();
    engine.play().unwrap();
    renderer.render_step().unwrap();

    engine.load_events(quarter_note(), 480).unwrap();
    assert_eq!(engine.status(), TransportState::Paused);
    assert_eq!(renderer.render_step().unwrap(), StepOutcome::Idle);

    assert_eq!(stats.lock().unwrap().discards, 2);
    assert_eq!(count(&log, |call| *call == SynthCall::SoftReset), 2);
}

#[test]
fn test_seek_schedules_soft_reset() {
    let engine = engine();
    let (synth, log) = RecordingSynth::new();
    let mut renderer = engine.renderer(synth, NullSink::new());

    engine.load_events(quarter_note(), 480).unwrap();
    renderer.render_step().unwrap();
    assert_eq!(count(&log, |call| *call == SynthCall::SoftReset), 1);

    engine.seek(100).unwrap();
    renderer.render_step().unwrap();
    assert_eq!(count(&log, |call| *call == SynthCall::SoftReset), 2);
}

#[test]
fn test_priming_after_seek_skips_notes() {
    let engine = engine();
    engine
        .load_events(
            vec![
                Event::note_on(0, 0, 60, 100),
                Event::program_change(0, 0, 12),
                Event::note_off(300, 0, 60),
            ],
            480,
        )
        .unwrap();
    engine.seek(200).unwrap();

    let (synth, log) = RecordingSynth::new();
    let mut renderer = engine.renderer(synth, NullSink::new());
    renderer.render_step().unwrap();

    assert_eq!(count(&log, |call| matches!(call, SynthCall::NoteOn { .. })), 0);
    assert_eq!(count(&log, |call| *call == SynthCall::Program { channel: 0, program: 12 }), 1);
}

#[test]
fn test_seek_to_start_before_first_step_keeps_notes() {
    let engine = engine();
    engine
        .load_events(vec![Event::note_on(0, 0, 60, 100), Event::note_off(480, 0, 60)], 480)
        .unwrap();
    assert_eq!(engine.seek(0).unwrap(), 0);
    engine.play().unwrap();

    let (synth, log) = RecordingSynth::new();
    let mut renderer = engine.renderer(synth, NullSink::new());
    let mut steps = 0;
    while renderer.render_step().unwrap() != StepOutcome::Finished {
        steps += 1;
        assert!(steps < 1000, "playback never finished");
    }

    assert_eq!(count(&log, |call| *call == SynthCall::NoteOn { channel: 0, note: 60, velocity: 100 }), 1);
    assert_eq!(count(&log, |call| *call == SynthCall::NoteOff { channel: 0, note: 60 }), 1);
}

#[test]
fn test_position_updates_reach_notifier() {
    let (producer, mut consumer) = create_position_channel(1024);
    let notifier = Arc::new(RingNotifier::new(producer));
    let (engine, _) = SequencerEngine::with_notifier(EngineConfig::default(), notifier.clone()).unwrap();

    engine.load_events(quarter_note(), 480).unwrap();
    engine.play().unwrap();
    let mut renderer = engine.renderer(SilentSynth, NullSink::new());
    while renderer.render_step().unwrap() != StepOutcome::Finished {}

    let mut updates = Vec::new();
    while let Some(update) = consumer.try_pop() {
        updates.push(update);
    }

    assert_eq!(notifier.dropped(), 0);
    assert!(updates.windows(2).all(|pair| pair[0].absolute_tick <= pair[1].absolute_tick));
    let last = updates.last().unwrap();
    assert_eq!(last.absolute_tick, 960);
    assert_eq!(last.measure, 1);
    assert_eq!(last.beat, 3);
}

#[test]
fn test_threaded_playback_runs_to_end() {
    let position = LatestPosition::new();
    let config = EngineConfig {
        sample_rate: 8000,
        ..EngineConfig::default()
    };
    let (engine, _) = SequencerEngine::with_notifier(config, Arc::new(position.clone())).unwrap();

    let (synth, log) = RecordingSynth::new();
    let (sink, stats) = RecordingSink::new();
    engine.start(synth, sink).unwrap();
    engine.load_events(quarter_note(), 480).unwrap();
    engine.play().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while count(&log, |call| matches!(call, SynthCall::NoteOff { .. })) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    while engine.status() == TransportState::Playing && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(engine.status(), TransportState::Paused);
    assert_eq!(position.get().absolute_tick, 960);

    engine.stop();
    assert_eq!(engine.status(), TransportState::Stopped);
    let stats = *stats.lock().unwrap();
    assert!(stats.drained);
    // One second at 8 kHz
    assert_eq!(stats.frames, 8000);
}
