#![no_main]

use std::time::{Duration, Instant};

use libfuzzer_sys::fuzz_target;
use transcast_core::config::PacingConfig;
use transcast_core::engine::WindowEngine;
use transcast_core::protocol::SyncMessage;
use transcast_core::store::ReconciliationStore;

// Each input line is one channel message. Undecodable lines advance the clock.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let t0 = Instant::now();
    let mut now = t0;
    let mut store = ReconciliationStore::new();
    let mut engine = WindowEngine::new(PacingConfig::default());
    engine.set_active(true, now);

    for line in text.lines() {
        match SyncMessage::decode(line) {
            Ok(message) => {
                if let Ok(encoded) = message.encode() {
                    assert_eq!(SyncMessage::decode(&encoded).ok().as_ref(), Some(&message));
                }
                store.apply(message.clone());
                engine.handle_message(message, now);
            }
            Err(_) => {
                now += Duration::from_millis(line.len() as u64 * 250);
                engine.advance(now);
            }
        }
        assert!(store.rendered_is_prefix());
        assert!(engine.store().rendered_is_prefix());
        if let Some(pending) = engine.scheduler().pending_index() {
            assert_eq!(engine.store().next_unrevealed().map(|r| r.index), Some(pending));
        }
    }
});
