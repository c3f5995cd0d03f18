mod common;

use common::*;

use pipit_audio::{Automation, NodeId, VoiceParam};
use pipit_core::{ChannelSelect, Controllers, SequenceKind, SfxCommand, TunerError, TunerEvent};
use pipit_types::MusicPattern;

#[test]
fn test_completion_counts_holes() {
    let (device, mut tuner) = make_tuner(3);
    let events = tuner.events();
    load(&mut tuner, 0, &["C3 q"]);
    load(&mut tuner, 2, &["E3 h"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0), None, Some(2)]))
        .unwrap();

    let (parts, on_finished) = counter();
    let (all, on_all_finished) = counter();
    let controllers = with_on_all_finished(
        with_on_finished(Controllers::new(), on_finished),
        on_all_finished,
    );
    tuner
        .music(SfxCommand::Play(0), 0, None, &[], controllers)
        .unwrap();
    assert_eq!(tuner.active_channels(), vec![0, 2]);
    assert_eq!(tuner.channel(0).unwrap().kind(), Some(SequenceKind::Music));

    advance(&device, &mut tuner, BEAT + EPS);
    assert_eq!(parts.get(), 1);
    assert_eq!(all.get(), 0);

    advance(&device, &mut tuner, 2.0 * BEAT + EPS);
    assert_eq!(parts.get(), 2);
    assert_eq!(all.get(), 1);
    assert!(drain(&events).contains(&TunerEvent::MusicFinished { pattern: 0 }));

    // no second firing
    advance(&device, &mut tuner, 4.0 * BEAT);
    assert_eq!(all.get(), 1);
}

#[test]
fn test_parts_share_start_time() {
    let (device, mut tuner) = make_tuner(2);
    load(&mut tuner, 0, &["C3 q"]);
    load(&mut tuner, 1, &["G3 q"]);
    tuner
        .set_music_pattern(1, MusicPattern::new(vec![Some(0), Some(1)]))
        .unwrap();
    device.advance_to(1.5);
    tuner
        .music(SfxCommand::Play(1), 0, None, &[], Controllers::new())
        .unwrap();

    for channel in 0..2 {
        let voice = tuner.channel(channel).unwrap().voice().unwrap();
        let gain = device.automations(voice, VoiceParam::Gain);
        assert_eq!(gain[0].time(), 1.5);
    }
}

#[test]
fn test_all_holes_finish_immediately() {
    let (_device, mut tuner) = make_tuner(2);
    tuner
        .set_music_pattern(0, MusicPattern::from_json("[null, -1]").unwrap())
        .unwrap();
    let (all, on_all_finished) = counter();
    tuner
        .music(
            SfxCommand::Play(0),
            0,
            None,
            &[],
            with_on_all_finished(Controllers::new(), on_all_finished),
        )
        .unwrap();
    assert_eq!(all.get(), 1);
    assert!(tuner.active_channels().is_empty());
}

#[test]
fn test_empty_sfx_slot_counts_as_hole() {
    let (device, mut tuner) = make_tuner(2);
    load(&mut tuner, 0, &["C3 q"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0), Some(5)]))
        .unwrap();
    let (all, on_all_finished) = counter();
    tuner
        .music(
            SfxCommand::Play(0),
            0,
            None,
            &[],
            with_on_all_finished(Controllers::new(), on_all_finished),
        )
        .unwrap();
    assert_eq!(tuner.active_channels(), vec![0]);
    advance(&device, &mut tuner, BEAT + EPS);
    assert_eq!(all.get(), 1);
}

#[test]
fn test_stop_music_leaves_sfx() {
    let (_device, mut tuner) = make_tuner(3);
    load(&mut tuner, 0, &["C3 w"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0)]))
        .unwrap();
    tuner
        .music(SfxCommand::Play(0), 0, None, &[], Controllers::new())
        .unwrap();
    tuner
        .sfx(SfxCommand::Play(0), ChannelSelect::Index(1), None, None, Controllers::new())
        .unwrap();

    tuner
        .music(SfxCommand::Stop, 0, None, &[], Controllers::new())
        .unwrap();
    assert!(tuner.is_idle(0));
    assert_eq!(tuner.channel(1).unwrap().kind(), Some(SequenceKind::Sfx));
}

#[test]
fn test_stopped_part_never_completes_piece() {
    let (device, mut tuner) = make_tuner(2);
    load(&mut tuner, 0, &["C3 q"]);
    load(&mut tuner, 1, &["E3 h"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0), Some(1)]))
        .unwrap();
    let (all, on_all_finished) = counter();
    tuner
        .music(
            SfxCommand::Play(0),
            0,
            None,
            &[],
            with_on_all_finished(Controllers::new(), on_all_finished),
        )
        .unwrap();

    tuner.stop(ChannelSelect::Index(0)).unwrap();
    advance(&device, &mut tuner, 2.0 * BEAT + EPS);
    assert!(tuner.active_channels().is_empty());
    assert_eq!(all.get(), 0);
}

#[test]
fn test_mask_monopolizes_channels() {
    let (_device, mut tuner) = make_tuner(2);
    load(&mut tuner, 0, &["C3 w"]);
    load(&mut tuner, 1, &["E3 w"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0), Some(0)]))
        .unwrap();
    tuner
        .music(SfxCommand::Play(0), 0b01, None, &[], Controllers::new())
        .unwrap();
    assert!(tuner.channel(0).unwrap().is_monopolized());
    assert!(!tuner.channel(1).unwrap().is_monopolized());

    let channel = tuner
        .sfx(SfxCommand::Play(1), ChannelSelect::Auto, None, None, Controllers::new())
        .unwrap();
    assert_eq!(channel, Some(1));
}

#[test]
fn test_fade_ramps_level() {
    let (device, mut tuner) = make_tuner(1);
    load(&mut tuner, 0, &["C3 w"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0)]))
        .unwrap();
    tuner
        .music(SfxCommand::Play(0), 0, Some(1.25), &[], Controllers::new())
        .unwrap();
    let voice = tuner.channel(0).unwrap().voice().unwrap();
    assert_eq!(
        device.automations(voice, VoiceParam::Level),
        vec![
            Automation::SetValue { value: 0.0, time: 0.0 },
            Automation::LinearRamp { value: 1.0, end_time: 1.25 },
        ]
    );
}

#[test]
fn test_malformed_processor_plays_nothing() {
    let (_device, mut tuner) = make_tuner(2);
    load(&mut tuner, 0, &["C3 q"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0), Some(0)]))
        .unwrap();
    let processors = vec![None, Some(vec![NodeId(3)])];
    let result = tuner.music(SfxCommand::Play(0), 0, None, &processors, Controllers::new());
    assert!(matches!(result, Err(TunerError::Config(_))));
    assert!(tuner.active_channels().is_empty());
}

#[test]
fn test_missing_music_pattern_is_noop() {
    let (_device, mut tuner) = make_tuner(2);
    let events = tuner.events();
    tuner
        .music(SfxCommand::Play(2), 0, None, &[], Controllers::new())
        .unwrap();
    assert!(matches!(
        drain(&events).as_slice(),
        [TunerEvent::MissingPattern { slot: 2, .. }]
    ));
    assert!(tuner
        .music(SfxCommand::Play(9), 0, None, &[], Controllers::new())
        .is_err());
}

#[test]
fn test_release_music_lets_loops_end() {
    let (device, mut tuner) = make_tuner(1);
    load(&mut tuner, 0, &["C3 q"]);
    tuner
        .set_music_pattern(0, MusicPattern::new(vec![Some(0)]))
        .unwrap();
    let (all, on_all_finished) = counter();
    tuner
        .music(
            SfxCommand::Play(0),
            0,
            None,
            &[],
            with_on_all_finished(Controllers::new().looping(true), on_all_finished),
        )
        .unwrap();
    advance(&device, &mut tuner, BEAT + EPS);
    assert!(!tuner.is_idle(0));

    tuner
        .music(SfxCommand::Release, 0, None, &[], Controllers::new())
        .unwrap();
    advance(&device, &mut tuner, 2.0 * BEAT + EPS);
    assert!(tuner.is_idle(0));
    assert_eq!(all.get(), 1);
}
