use std::sync::{Arc, Mutex};

use ariston_net::{AristonClient, Event, TickOutcome};

/// Run with: cargo test --test integration -- --ignored
/// Requires a real account:
///   ARISTON_USERNAME=... ARISTON_PASSWORD=... cargo test --test integration -- --ignored
#[tokio::test]
#[ignore]
async fn login_and_poll() {
    let username = std::env::var("ARISTON_USERNAME").expect("ARISTON_USERNAME not set");
    let password = std::env::var("ARISTON_PASSWORD").expect("ARISTON_PASSWORD not set");

    let events: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(vec![]));
    let events_clone = events.clone();

    let client = AristonClient::builder(username, password)
        .on_event(move |event| {
            events_clone.lock().unwrap().push(event.clone());
        })
        .build()
        .expect("build failed");

    // The service is slow and flaky; give it a few ticks.
    let mut outcome = client.refresh().await;
    for _ in 0..3 {
        if outcome == TickOutcome::Updated {
            break;
        }
        outcome = client.refresh().await;
    }
    assert_eq!(outcome, TickOutcome::Updated, "poll never succeeded");

    let state = client.read_state().expect("no state after poll");
    println!("{state:#?}");

    {
        let captured = events.lock().unwrap();
        assert!(!captured.is_empty(), "should have received events");
    }

    client.shutdown().await;
}
