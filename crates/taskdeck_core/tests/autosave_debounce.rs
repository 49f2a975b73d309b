use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskdeck_core::{AutoSaveEvent, AutoSaveScheduler, ManualScheduler, SaveStatus};

fn autosave(delay_ms: u64) -> (Arc<ManualScheduler>, AutoSaveScheduler) {
    let manual = Arc::new(ManualScheduler::default());
    let autosave = AutoSaveScheduler::new(
        manual.clone(),
        manual.clone(),
        Duration::from_millis(delay_ms),
    );
    (manual, autosave)
}

#[tokio::test]
async fn rapid_edits_produce_one_save_with_the_last_state() {
    let (manual, autosave) = autosave(1_000);
    let form_state = Arc::new(Mutex::new(String::new()));
    let saves = Arc::new(Mutex::new(Vec::new()));

    for n in 1..=5 {
        *form_state.lock().unwrap() = format!("draft v{n}");
        let state = Arc::clone(&form_state);
        let saves = Arc::clone(&saves);
        autosave.schedule_default("form-7", move || async move {
            let current = state.lock().unwrap().clone();
            saves.lock().unwrap().push(current);
            Ok(())
        });
        manual.advance(Duration::from_millis(200)).await;
    }
    assert!(saves.lock().unwrap().is_empty());
    assert_eq!(manual.pending_count(), 1);

    manual.advance(Duration::from_millis(1_000)).await;
    assert_eq!(*saves.lock().unwrap(), vec!["draft v5".to_string()]);
    assert_eq!(autosave.status("form-7"), SaveStatus::Saved);
    assert!(!autosave.is_pending("form-7"));
}

#[tokio::test]
async fn keys_debounce_independently() {
    let (manual, autosave) = autosave(500);
    let saves = Arc::new(Mutex::new(Vec::new()));
    for key in ["a", "b"] {
        let saves = Arc::clone(&saves);
        autosave.schedule_default(key, move || async move {
            saves.lock().unwrap().push(key);
            Ok(())
        });
    }
    manual.advance(Duration::from_millis(500)).await;
    let mut saved = saves.lock().unwrap().clone();
    saved.sort_unstable();
    assert_eq!(saved, vec!["a", "b"]);
}

#[tokio::test]
async fn clear_all_cancels_every_pending_timer() {
    let (manual, autosave) = autosave(500);
    let saves = Arc::new(Mutex::new(0));
    for key in ["a", "b", "c"] {
        let saves = Arc::clone(&saves);
        autosave.schedule(
            key,
            move || async move {
                *saves.lock().unwrap() += 1;
                Ok(())
            },
            Duration::from_millis(100),
        );
    }
    autosave.clear_all();
    manual.advance(Duration::from_secs(1)).await;
    assert_eq!(*saves.lock().unwrap(), 0);
    assert_eq!(manual.pending_count(), 0);
}

#[tokio::test]
async fn every_listener_for_a_key_is_invoked() {
    let (manual, autosave) = autosave(100);
    let heard = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second"] {
        let heard = Arc::clone(&heard);
        autosave.on("k", AutoSaveEvent::Saved, move |notice| {
            heard.lock().unwrap().push((name, notice.key.clone()));
        });
    }
    let other = Arc::clone(&heard);
    autosave.on("other", AutoSaveEvent::Saved, move |_| {
        other.lock().unwrap().push(("other", String::new()));
    });

    autosave.schedule_default("k", || async { Ok(()) });
    manual.advance(Duration::from_millis(100)).await;

    assert_eq!(
        *heard.lock().unwrap(),
        vec![("first", "k".to_string()), ("second", "k".to_string())]
    );
}
