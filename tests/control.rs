//! Control surface integration tests

use std::time::Duration;

use voxloop::assistant::{AssistantEvent, MICROPHONE_NOT_SELECTED};
use voxloop::control::ControlSurface;
use voxloop::{AssistantState, VoiceId, VoiceProfile};

mod common;
use common::{
    CollectingListener, FakeMicrophones, FakeSynthesizer, Probes, RecordingSink, ScriptedSpeech,
    scripted, test_settings, wait_until,
};

fn surface(lines: &[&str]) -> (ControlSurface, Probes) {
    let (collaborators, probes) = scripted(lines);
    let surface = ControlSurface::new(
        collaborators,
        test_settings(),
        VoiceProfile::default(),
        Box::new(FakeMicrophones),
    );
    (surface, probes)
}

/// Pump until `done` holds for the collected events
fn pump_until(
    surface: &mut ControlSurface,
    listener: &mut CollectingListener,
    mut done: impl FnMut(&CollectingListener) -> bool,
) -> bool {
    wait_until(Duration::from_secs(5), || {
        surface.pump(listener);
        done(listener)
    })
}

#[test]
fn test_volume_out_of_range_is_reported() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_volume(150);
    surface.pump(&mut listener);

    assert_eq!(listener.statuses, vec!["Volume must be 0-100, got 150"]);
    assert_eq!(surface.profile().volume_percent(), 50);
}

#[test]
fn test_volume_change_applies() {
    let (mut surface, probes) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_volume(30);
    surface.pump(&mut listener);

    assert_eq!(listener.statuses, vec!["Volume: 30"]);
    assert_eq!(surface.profile().volume_percent(), 30);
    // Not running, so the announcement is dropped
    assert!(probes.synthesizer.calls().is_empty());
}

#[test]
fn test_unknown_voice_is_reported() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_voice("nobody");
    surface.pump(&mut listener);

    assert_eq!(listener.statuses, vec!["unknown voice: nobody"]);
    assert_eq!(surface.profile().speaker, VoiceId::Xenia);
}

#[test]
fn test_voice_change_applies() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_voice("Aidar");
    surface.pump(&mut listener);

    assert_eq!(listener.statuses, vec!["Voice: aidar"]);
    assert_eq!(surface.profile().speaker, VoiceId::Aidar);
}

#[test]
fn test_missing_microphone_index_is_reported() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_microphone(7);
    surface.pump(&mut listener);

    assert_eq!(listener.statuses.len(), 1);
    assert!(listener.statuses[0].starts_with("microphone unavailable"));
    assert_eq!(surface.microphone_index(), None);
}

#[test]
fn test_start_without_microphone_waits() {
    let (mut surface, probes) = surface(&["пока"]);
    let mut listener = CollectingListener::default();

    surface.start();
    assert!(pump_until(&mut surface, &mut listener, |l| {
        l.statuses.iter().any(|s| s == MICROPHONE_NOT_SELECTED)
    }));
    assert!(listener.statuses.iter().any(|s| s == "Working"));
    assert!(surface.is_running());
    assert_eq!(surface.state(), AssistantState::Idle);
    assert!(listener.listening.is_empty());

    surface.set_microphone(0);
    assert_eq!(surface.microphone_index(), Some(0));
    assert!(pump_until(&mut surface, &mut listener, |l| {
        l.states.last() == Some(&AssistantState::Stopped)
    }));

    assert!(listener.statuses.iter().any(|s| s == "Microphone: test mic"));
    assert!(listener.statuses.iter().any(|s| s == "You said: пока"));
    assert_eq!(listener.listening, vec![true, false]);
    assert_eq!(probes.synthesizer.texts(), vec!["Goodbye! It's been a pleasure."]);
    assert!(wait_until(Duration::from_secs(5), || !surface.is_running()));
}

#[test]
fn test_start_while_running_is_noop() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.set_microphone(0);
    surface.start();
    surface.start();
    surface.shutdown();
    surface.pump(&mut listener);

    let working = listener.statuses.iter().filter(|s| *s == "Working").count();
    assert_eq!(working, 1);
    assert!(listener
        .statuses
        .iter()
        .any(|s| s == "Assistant is already running"));
    assert!(!surface.is_running());
    assert_eq!(surface.state(), AssistantState::Stopped);
}

#[test]
fn test_settings_announced_while_running() {
    let (mut surface, probes) = surface(&[]);

    surface.set_microphone(0);
    surface.start();
    surface.set_voice("baya");
    surface.set_volume(40);
    surface.set_volume(45);

    assert!(wait_until(Duration::from_secs(5), || {
        probes.synthesizer.calls().len() >= 2
    }));
    surface.shutdown();

    let calls = probes.synthesizer.calls();
    assert_eq!(
        calls,
        vec![
            ("Now I'm using my voice baya".to_string(), "baya".to_string()),
            ("The volume is set to 40".to_string(), "baya".to_string()),
        ]
    );
}

#[test]
fn test_stop_speaking_cuts_reply_short() {
    let (sink, recording) = RecordingSink::new();
    let (collaborators, probes) = common::wire(
        ScriptedSpeech::saying(&["как дела"]),
        FakeSynthesizer::new(400 * 1024),
        sink.paced(Duration::from_millis(2)),
    );
    let mut surface = ControlSurface::new(
        collaborators,
        test_settings(),
        VoiceProfile::default(),
        Box::new(FakeMicrophones),
    );

    assert!(!surface.stop_speaking());

    surface.set_microphone(0);
    surface.start();
    assert!(wait_until(Duration::from_secs(5), || recording.callbacks() >= 3));
    assert_eq!(surface.state(), AssistantState::Speaking);
    assert!(surface.stop_speaking());

    assert!(wait_until(Duration::from_secs(5), || {
        probes.playback.current().is_none()
    }));
    assert!(recording.non_zero() < 400 * 1024);
    assert!(surface.is_running());

    surface.stop();
    surface.shutdown();
    assert_eq!(surface.state(), AssistantState::Stopped);
}

#[test]
fn test_stop_when_idle_is_reported() {
    let (mut surface, _) = surface(&[]);
    let mut listener = CollectingListener::default();

    surface.stop();
    surface.pump(&mut listener);

    assert_eq!(listener.statuses, vec!["Assistant is not running"]);
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let (mut surface, _) = surface(&["привет", "до свидания"]);

    surface.set_microphone(0);
    surface.start();

    let mut events = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = surface.next_event().await {
            let stopped = event == AssistantEvent::State(AssistantState::Stopped);
            events.push(event);
            if stopped {
                break;
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "no Stopped event in {events:?}");

    let said: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            AssistantEvent::Status(text) if text.starts_with("You said") => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(said, vec!["You said: привет", "You said: до свидания"]);

    let first = events
        .iter()
        .position(|e| *e == AssistantEvent::Status("Microphone: test mic".into()));
    let listening = events
        .iter()
        .position(|e| *e == AssistantEvent::Listening(true));
    assert!(first < listening);
}

#[test]
fn test_next_event_waits_when_queue_is_empty() {
    let (mut surface, _) = surface(&[]);

    {
        let mut next = tokio_test::task::spawn(surface.next_event());
        tokio_test::assert_pending!(next.poll());
    }

    surface.set_volume(20);
    let mut next = tokio_test::task::spawn(surface.next_event());
    let event = tokio_test::assert_ready!(next.poll());
    assert_eq!(event, Some(AssistantEvent::Status("Volume: 20".into())));
}
