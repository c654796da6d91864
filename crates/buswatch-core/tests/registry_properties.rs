//! Property-based tests for the topic registry.
//!
//! Applies random operation sequences and checks that the bidirectional
//! indexes never drift apart and cleanup leaves nothing behind.

use buswatch_core::{Channel, TopicRegistry};
use proptest::prelude::*;

/// One registry operation, over small id spaces so sequences collide often.
#[derive(Debug, Clone)]
enum Op {
    Register(u8, bool),
    JoinAsDriver(u8, u8),
    Subscribe(u8, u8),
    Unsubscribe(u8, u8),
    Disconnect(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, any::<bool>()).prop_map(|(s, admin)| Op::Register(s, admin)),
        (0u8..8, 1u8..5).prop_map(|(s, d)| Op::JoinAsDriver(s, d)),
        (0u8..8, 1u8..5).prop_map(|(s, d)| Op::Subscribe(s, d)),
        (0u8..8, 1u8..5).prop_map(|(s, d)| Op::Unsubscribe(s, d)),
        (0u8..8).prop_map(Op::Disconnect),
    ]
}

fn apply(registry: &mut TopicRegistry, op: &Op) {
    match *op {
        Op::Register(s, admin) => {
            let channel = if admin { Channel::Admin } else { Channel::User };
            registry.register_session(u64::from(s), channel);
        },
        Op::JoinAsDriver(s, d) => {
            registry.join_as_driver(u64::from(s), u64::from(d));
        },
        Op::Subscribe(s, d) => {
            registry.subscribe(u64::from(s), u64::from(d));
        },
        Op::Unsubscribe(s, d) => {
            registry.unsubscribe(u64::from(s), u64::from(d));
        },
        Op::Disconnect(s) => {
            registry.unregister_session(u64::from(s));
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: both subscription indexes always agree.
    #[test]
    fn prop_indexes_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut registry = TopicRegistry::new();

        for op in &ops {
            apply(&mut registry, op);

            for session in 0u64..8 {
                for driver in 1u64..5 {
                    let via_topic = registry.subscribers(driver).any(|s| s == session);
                    let via_session =
                        registry.topics_for_session(session).any(|d| d == driver);
                    prop_assert_eq!(via_topic, via_session);
                }
            }
        }
    }

    /// Property: only registered sessions ever appear as subscribers.
    #[test]
    fn prop_subscribers_are_registered(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut registry = TopicRegistry::new();

        for op in &ops {
            apply(&mut registry, op);

            for driver in 1u64..5 {
                for session in registry.subscribers(driver).collect::<Vec<_>>() {
                    prop_assert!(registry.has_session(session));
                }
            }
        }
    }

    /// Property: a disconnected session appears nowhere.
    #[test]
    fn prop_disconnect_leaves_nothing(
        ops in prop::collection::vec(op_strategy(), 1..60),
        victim in 0u8..8,
    ) {
        let mut registry = TopicRegistry::new();

        for op in &ops {
            apply(&mut registry, op);
        }

        registry.unregister_session(u64::from(victim));

        prop_assert!(!registry.has_session(u64::from(victim)));
        prop_assert_eq!(registry.topics_for_session(u64::from(victim)).count(), 0);
        prop_assert_eq!(registry.ingress_driver(u64::from(victim)), None);
        for driver in 1u64..5 {
            prop_assert!(!registry.is_subscribed(u64::from(victim), driver));
        }
        prop_assert!(registry.admin_sessions().all(|s| s != u64::from(victim)));
    }

    /// Property: subscribing twice is the same as subscribing once.
    #[test]
    fn prop_subscribe_is_idempotent(session in 0u64..8, driver in 1u64..5) {
        let mut registry = TopicRegistry::new();
        registry.register_session(session, Channel::User);

        registry.subscribe(session, driver);
        let once = registry.subscriber_count(driver);
        registry.subscribe(session, driver);
        let twice = registry.subscriber_count(driver);

        prop_assert_eq!(once, 1);
        prop_assert_eq!(twice, 1);
    }

    /// Property: unsubscribe of a never-subscribed pair changes nothing.
    #[test]
    fn prop_unsubscribe_noop(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut registry = TopicRegistry::new();
        for op in &ops {
            apply(&mut registry, op);
        }

        // Session 200 was never registered; driver 99 never subscribed to.
        let before: Vec<_> = (1u64..5).map(|d| registry.subscriber_count(d)).collect();
        registry.unsubscribe(200, 99);
        let after: Vec<_> = (1u64..5).map(|d| registry.subscriber_count(d)).collect();

        prop_assert_eq!(before, after);
    }
}
