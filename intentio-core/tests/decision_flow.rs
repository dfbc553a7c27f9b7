//! End-to-end decision pipeline tests: bytes in, gated reports and events
//! out, with concurrent onboarding traffic.

use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use intentio_core::{
    Classification, ClassifierHandle, DecisionEvent, EngineConfig, FeatureVector, HelpOption,
    IntentClassifier, IntentioEngine, MainIntent, MemoryStore, PersonalizationStore, SessionState,
    FEATURE_DIM,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn spoken_utterance() -> Vec<u8> {
    // 0.3 s of a modulated tone — enough energy to pass validation.
    let samples: Vec<f32> = (0..4800)
        .map(|i| ((i as f32) * 0.08).sin() * 0.4)
        .collect();
    wav_bytes(&samples, 16_000)
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<DecisionEvent>,
    timeout: Duration,
) -> DecisionEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for decision event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("decision channel closed unexpectedly"),
        }
    }
}

struct ScriptedClassifier {
    main: Classification<MainIntent>,
    help: Classification<HelpOption>,
}

impl IntentClassifier for ScriptedClassifier {
    fn classify_main(&mut self, _features: &FeatureVector) -> Classification<MainIntent> {
        self.main
    }

    fn classify_help(&mut self, _features: &FeatureVector) -> Classification<HelpOption> {
        self.help
    }
}

fn scripted_engine(
    main: Classification<MainIntent>,
    help: Classification<HelpOption>,
) -> IntentioEngine {
    let config = EngineConfig::default();
    let store = Arc::new(MemoryStore::new(config.min_samples_per_intent));
    IntentioEngine::new(
        config,
        ClassifierHandle::new(ScriptedClassifier { main, help }),
        store,
    )
}

#[test]
fn wav_utterance_flows_through_the_default_pipeline() {
    let engine = IntentioEngine::with_defaults();
    let bytes = spoken_utterance();

    assert!(engine.validate_audio(&bytes));
    let features = engine.extract_features(&bytes);
    assert_eq!(features.dim(), FEATURE_DIM);

    let report = engine.process_utterance(&bytes, None).unwrap();
    assert!((0.0..=1.0).contains(&report.confidence));
    assert!(["YES", "NO", "HELP", "EMERGENCY"].contains(&report.intent.as_str()));
    assert_eq!(report.requires_confirmation, report.session_id.is_some());
}

#[test]
fn help_menu_utterance_reports_a_digit_option() {
    let engine = IntentioEngine::with_defaults();
    let report = engine
        .process_help_utterance(&spoken_utterance(), None)
        .unwrap();
    assert!(["1", "2", "3", "4"].contains(&report.intent.as_str()));
}

#[test]
fn empty_upload_still_produces_a_gated_report() {
    let engine = IntentioEngine::with_defaults();
    assert!(!engine.validate_audio(&[]));

    // Extraction is total, so the pipeline degrades to the zero vector and
    // a low-confidence report instead of failing the request.
    let report = engine.process_utterance(&[], None).unwrap();
    assert!(report.requires_confirmation || report.emergency);
}

#[test]
fn emergency_event_reaches_subscribers_on_other_threads() {
    let engine = Arc::new(scripted_engine(
        Classification::new(MainIntent::Emergency, 0.4),
        Classification::new(HelpOption::Water, 0.9),
    ));
    let mut rx = engine.subscribe_decisions();

    let worker = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            engine
                .process_utterance(&spoken_utterance(), Some("user-7"))
                .unwrap()
        })
    };
    let report = worker.join().unwrap();

    assert!(report.emergency);
    assert!(report.confidence >= 0.88);
    assert!(!report.requires_confirmation);

    let event = recv_event_with_timeout(&mut rx, Duration::from_secs(1));
    assert!(event.emergency);
    assert_eq!(event.user_id.as_deref(), Some("user-7"));
    assert_eq!(event.intent, "EMERGENCY");
}

#[test]
fn confirmation_round_trip_executes_exactly_once() {
    let engine = scripted_engine(
        Classification::new(MainIntent::No, 0.55),
        Classification::new(HelpOption::Water, 0.9),
    );

    let report = engine.process_utterance(&spoken_utterance(), None).unwrap();
    let session_id = report.session_id.expect("low confidence opens a session");
    assert_eq!(
        engine.session_state(&session_id),
        Some(SessionState::Pending)
    );

    use intentio_core::ConfirmOutcome;
    assert_eq!(engine.confirm(&session_id, true), ConfirmOutcome::Execute);
    assert_eq!(
        engine.confirm(&session_id, true),
        ConfirmOutcome::AlreadyResolved(SessionState::Confirmed)
    );
}

#[test]
fn rejected_confirmation_expects_a_fresh_utterance() {
    let engine = scripted_engine(
        Classification::new(MainIntent::Help, 0.5),
        Classification::new(HelpOption::Pain, 0.5),
    );

    let first = engine.process_utterance(&spoken_utterance(), None).unwrap();
    let session_id = first.session_id.unwrap();

    use intentio_core::ConfirmOutcome;
    assert_eq!(engine.confirm(&session_id, false), ConfirmOutcome::Retry);

    // The retry is a brand-new utterance with its own session.
    let second = engine.process_utterance(&spoken_utterance(), None).unwrap();
    let second_session = second.session_id.unwrap();
    assert_ne!(session_id, second_session);
}

#[test]
fn concurrent_onboarding_counts_are_exact() {
    let engine = Arc::new(IntentioEngine::with_defaults());
    let features = FeatureVector::from_values(vec![0.2; FEATURE_DIM]);

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let features = features.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    engine
                        .add_onboarding_sample("user-a", "YES", &features)
                        .unwrap();
                    engine
                        .add_onboarding_sample("user-b", "NO", &features)
                        .unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(engine.sample_count("user-a", "YES").unwrap(), 80);
    assert_eq!(engine.sample_count("user-b", "NO").unwrap(), 80);
    assert_eq!(engine.sample_count("user-a", "NO").unwrap(), 0);
}

#[test]
fn training_gate_holds_under_concurrent_submissions() {
    let store = Arc::new(MemoryStore::new(3));
    let features = FeatureVector::from_values(vec![0.1; FEATURE_DIM]);

    for _ in 0..3 {
        store.add_sample("u", "YES", &features).unwrap();
    }
    // HELP bank exists below the minimum: the gate must stay closed until
    // the racing adders finish.
    store.add_sample("u", "HELP", &features).unwrap();

    let adders: Vec<_> = (0..2)
        .map(|_| {
            let store = Arc::clone(&store);
            let features = features.clone();
            thread::spawn(move || {
                store.add_sample("u", "HELP", &features).unwrap();
            })
        })
        .collect();

    let trainer = {
        let store = Arc::clone(&store);
        thread::spawn(move || loop {
            if store.train("u").unwrap() {
                break;
            }
            thread::yield_now();
        })
    };

    for t in adders {
        t.join().unwrap();
    }
    trainer.join().unwrap();

    let profile = store.profile("u").unwrap().unwrap();
    assert_eq!(profile.trained_intents, vec!["HELP", "YES"]);
    assert_eq!(profile.total_samples, 6);
}

#[test]
fn onboarded_user_gets_their_personalized_model() {
    let engine = IntentioEngine::with_defaults();

    // Distinct per-label clusters on otherwise-unused slots.
    let mut yes_values = vec![0.0f32; FEATURE_DIM];
    yes_values[50] = 1.0;
    let yes_like = FeatureVector::from_values(yes_values);

    let mut emergency_values = vec![0.0f32; FEATURE_DIM];
    emergency_values[60] = 1.0;
    let emergency_like = FeatureVector::from_values(emergency_values);

    for _ in 0..3 {
        engine
            .add_onboarding_sample("u", "YES", &yes_like)
            .unwrap();
        engine
            .add_onboarding_sample("u", "EMERGENCY", &emergency_like)
            .unwrap();
    }
    assert!(engine.train_user("u").unwrap());
    assert!(engine.is_onboarded("u").unwrap());

    let c = engine.classify_main_intent_for("u", &yes_like).unwrap();
    assert_eq!(c.label, MainIntent::Yes);

    let c = engine
        .classify_main_intent_for("u", &emergency_like)
        .unwrap();
    assert_eq!(c.label, MainIntent::Emergency);

    // The gate still applies on top of the personalized classification.
    let decision = engine.decide_confirmation(&c);
    assert!(!decision.requires_confirmation);
    assert!(decision.reported_confidence >= 0.88);
}
