//! Property-based tests over simulated sessions
//!
//! Random joins, connection drops, rejoins with wiped key records, clock
//! advances and messages are applied to a cluster. Once every participant is back online:
//!
//! 1. **Agreement**: every pair of participants holds identical secrets
//! 2. **Freshness**: every participant knows each peer's current key
//! 3. **Monotonic announcements**: no participant announced a lower `seq`
//!    than before

use std::time::Duration;

use hushlink_client::{ChannelState, SessionId};
use hushlink_harness::SimCluster;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Join,
    Drop(usize),
    Rejoin(usize),
    Advance(u64),
    Send(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::Join),
        3 => (0usize..8).prop_map(Op::Drop),
        1 => (0usize..8).prop_map(Op::Rejoin),
        3 => (0u64..3_000).prop_map(Op::Advance),
        2 => (0usize..8).prop_map(Op::Send),
    ]
}

fn settle(cluster: &mut SimCluster) {
    for _ in 0..10 {
        let all_open = (0..cluster.len())
            .all(|idx| cluster.client(idx).channel_state() == ChannelState::Open);
        if all_open {
            return;
        }
        cluster.advance(Duration::from_secs(2)).unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_participants_converge_on_current_keys(
        seed in any::<u64>(),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        let mut cluster = SimCluster::new(seed, SessionId(seed));
        cluster.join("p-0", "000000").unwrap();
        let mut last_seq = vec![cluster.client(0).announced_seq()];

        for op in ops {
            match op {
                Op::Join if cluster.len() < 6 => {
                    let idx = cluster.len();
                    cluster.join(&format!("p-{idx}"), "123456").unwrap();
                    last_seq.push(0);
                },
                Op::Join => {},
                Op::Drop(idx) => {
                    let idx = idx % cluster.len();
                    cluster.drop_connection(idx, "fault").unwrap();
                },
                Op::Rejoin(idx) => {
                    let idx = idx % cluster.len();
                    cluster.teardown(idx, true).unwrap();
                    cluster.restart(idx).unwrap();
                },
                Op::Advance(ms) => cluster.advance(Duration::from_millis(ms)).unwrap(),
                Op::Send(idx) => {
                    let idx = idx % cluster.len();
                    if cluster.client(idx).channel_state() == ChannelState::Open {
                        cluster.send(idx, "ping").unwrap();
                    }
                },
            }

            for (idx, last) in last_seq.iter_mut().enumerate() {
                let seq = cluster.client(idx).announced_seq();
                prop_assert!(seq >= *last);
                *last = seq;
            }
        }

        settle(&mut cluster);

        for idx in 0..cluster.len() {
            prop_assert_eq!(cluster.client(idx).channel_state(), ChannelState::Open);

            let keys = cluster.client(idx).peer_keys();
            prop_assert_eq!(keys.len(), cluster.len() - 1);
            for peer in (0..cluster.len()).filter(|&peer| peer != idx) {
                prop_assert_eq!(
                    keys.get(&cluster.participant(peer).id).copied(),
                    cluster.client(peer).ephemeral_public_key()
                );
            }
        }
        prop_assert!(cluster.secrets_agree());
    }
}
