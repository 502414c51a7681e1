//! Property-based tests for the group lifecycle state machine

use engage_core::protocol::{GroupLifecycle, GroupRuntimeState, LifecycleEvent, LifecycleState};
use engage_core::protocol::{TxEvent, TxOutcome, TxState};
use engage_core::types::GroupId;
use proptest::prelude::*;

fn arb_lifecycle_event() -> impl Strategy<Value = LifecycleEvent> {
    prop_oneof![
        Just(LifecycleEvent::CreateRequested {
            config_json: "{}".to_string()
        }),
        Just(LifecycleEvent::Created),
        Just(LifecycleEvent::CreateFailed),
        Just(LifecycleEvent::JoinRequested),
        Just(LifecycleEvent::Joined),
        Just(LifecycleEvent::JoinFailed),
        Just(LifecycleEvent::LeaveRequested),
        Just(LifecycleEvent::Left),
        Just(LifecycleEvent::DeleteRequested),
        Just(LifecycleEvent::Deleted),
    ]
}

fn arb_tx_event() -> impl Strategy<Value = TxEvent> {
    prop_oneof![
        Just(TxEvent::Requested),
        Just(TxEvent::Started),
        Just(TxEvent::Released),
        Just(TxEvent::Terminated(TxOutcome::Ended)),
        Just(TxEvent::Terminated(TxOutcome::Failed)),
        Just(TxEvent::Terminated(TxOutcome::Usurped)),
        Just(TxEvent::Terminated(TxOutcome::Expired)),
        Just(TxEvent::Reset),
    ]
}

proptest! {
    /// Property: created and create-error are never both set
    #[test]
    fn created_and_create_error_are_exclusive(events in prop::collection::vec(arb_lifecycle_event(), 0..64)) {
        let mut lifecycle = GroupLifecycle::new(GroupId::new("{g}"));
        let mut runtime = GroupRuntimeState::new();

        for event in events {
            let before = lifecycle.clone();
            match lifecycle.clone().transition(event) {
                Ok(transition) => lifecycle = transition.new_state,
                Err(_) => prop_assert_eq!(&lifecycle, &before),
            }
            runtime.lifecycle = lifecycle.state;
            prop_assert!(!(runtime.created() && runtime.create_error()));
            prop_assert!(!(runtime.joined() && runtime.join_error()));
        }
    }

    /// Property: only Deleted returns a group to Idle
    #[test]
    fn idle_only_after_delete(events in prop::collection::vec(arb_lifecycle_event(), 1..64)) {
        let mut lifecycle = GroupLifecycle::new(GroupId::new("{g}"));
        for event in events {
            let was_deleted = matches!(event, LifecycleEvent::Deleted);
            let from = lifecycle.state;
            if let Ok(transition) = lifecycle.clone().transition(event) {
                lifecycle = transition.new_state;
                if lifecycle.state == LifecycleState::Idle && from != LifecycleState::Idle {
                    prop_assert!(was_deleted);
                }
            }
        }
    }

    /// Property: a usurped transmit is never also active or failed
    #[test]
    fn tx_outcomes_are_distinct(events in prop::collection::vec(arb_tx_event(), 0..64)) {
        let mut runtime = GroupRuntimeState::new();
        for event in events {
            if let Ok(next) = runtime.tx.transition(event) {
                runtime.tx = next;
            }
            let flags = [runtime.tx_active(), runtime.tx_pending(), runtime.tx_error(), runtime.tx_usurped()];
            prop_assert!(flags.iter().filter(|f| **f).count() <= 1);
            if runtime.tx == TxState::Expired {
                prop_assert!(!runtime.tx_usurped() && !runtime.tx_error());
            }
        }
    }
}
