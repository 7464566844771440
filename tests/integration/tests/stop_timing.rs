//! Randomized stop timing
//!
//! Stopping may race the producer, an in-flight frame wait and the render
//! callbacks at any point. Whatever the interleaving, every pooled buffer
//! must come back exactly once.

use animplayer::utils::{PlaybackConfig, ReleasePolicy};
use animplayer_integration_tests::{Harness, ScriptedDecoder};
use proptest::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

fn release_policy() -> impl Strategy<Value = ReleasePolicy> {
    prop_oneof![Just(ReleasePolicy::Immediate), Just(ReleasePolicy::Deferred)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn buffers_balance_after_stop(
        durations in prop::collection::vec(1u32..20, 1..4),
        loop_count in 0u32..3,
        decode_delay_ms in 0u64..4,
        callbacks in 0usize..20,
        gap_us in 0u64..3_000,
        restart in any::<bool>(),
        policy in release_policy(),
    ) {
        let decoder = ScriptedDecoder::new(&durations, loop_count)
            .with_decode_delay(Duration::from_millis(decode_delay_ms));
        let config = PlaybackConfig {
            release_policy: policy,
            ..PlaybackConfig::default()
        };
        let mut h = Harness::new(decoder, config).unwrap();

        h.controller.start().unwrap();
        for _ in 0..callbacks {
            h.callback(Instant::now());
            thread::sleep(Duration::from_micros(gap_us));
        }
        h.controller.stop();
        prop_assert!(!h.controller.is_running());
        prop_assert!(h.controller.queued_frames() == 0);

        if restart {
            h.controller.start().unwrap();
            h.callback(Instant::now());
            h.controller.stop();
        }

        // A wait that already took a frame hands it back on its own thread,
        // so the ledger is only settled once the runtime is gone.
        let pool = h.pool.clone();
        drop(h);
        prop_assert_eq!(pool.outstanding(), 0);
        prop_assert_eq!(pool.double_releases(), 0);
    }
}
