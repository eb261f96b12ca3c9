//! Model-based property tests.
//!
//! Random operation sequences are applied to a simulated router and the
//! cross-component invariants are checked after every step.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!                          ▼
//!     World { DuaManager, SimHost, ScriptedRegistrar }
//!                          │
//!                          ▼
//!              check_invariants() after each step
//! ```

use arbitrary::{Arbitrary, Unstructured};
use meshreg_harness::{Operation, World};
use proptest::prelude::*;

/// Strategy for generating operations, weighted towards time passing and
/// child churn.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let slot = any::<u8>();
    let verdict = any::<u8>();

    prop_oneof![
        3 => Just(Operation::AddPrefix),
        1 => Just(Operation::RemovePrefix),
        1 => Just(Operation::RefreshPrefix),
        1 => Just(Operation::NetdataUnchanged),
        1 => Just(Operation::DropDomainContext),
        1 => Just(Operation::Detach),
        1 => Just(Operation::AttachAsChild),
        2 => Just(Operation::PromoteToRouter),
        1 => Just(Operation::PrimaryAdded),
        1 => Just(Operation::PrimaryRereg),
        3 => slot.clone().prop_map(|slot| Operation::ChildAdded { slot }),
        2 => slot.clone().prop_map(|slot| Operation::ChildChanged { slot }),
        1 => slot.prop_map(|slot| Operation::ChildRemoved { slot }),
        6 => any::<u8>().prop_map(|count| Operation::Tick { count }),
        5 => Just(Operation::Deliver),
        3 => verdict.clone().prop_map(|verdict| Operation::Script { verdict }),
        1 => (verdict, any::<bool>()).prop_map(|(verdict, own)| Operation::Notify { verdict, own }),
        1 => any::<u64>().prop_map(|iid| Operation::SetFixedIid { iid }),
        1 => Just(Operation::ClearFixedIid),
        1 => Just(Operation::RemoveDua),
        1 => any::<bool>().prop_map(|no_bufs| Operation::SendFault { no_bufs }),
    ]
}

proptest! {
    /// Every invariant holds after every step of any operation sequence.
    #[test]
    fn prop_invariants_hold(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..120)
    ) {
        let mut world = World::router(seed);

        for (i, op) in ops.iter().enumerate() {
            world.apply(op);
            if let Err(violation) = world.check_invariants() {
                prop_assert!(false, "step {}: {:?}: {}", i, op, violation);
            }
        }
    }

    /// Same seed and operations produce the same traffic.
    #[test]
    fn prop_deterministic(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut a = World::router(seed);
        let mut b = World::router(seed);

        for op in &ops {
            a.apply(op);
            b.apply(op);
        }

        let targets = |world: &World| -> Vec<_> {
            world.host.sent().iter().map(|s| (s.request.target, s.at)).collect()
        };
        prop_assert_eq!(targets(&a), targets(&b));
        prop_assert_eq!(a.manager.dad_counter(), b.manager.dad_counter());
        prop_assert_eq!(a.manager.state(), b.manager.state());
    }

    /// Once the registrar accepts everything and time passes, every tracked
    /// address ends up registered.
    #[test]
    fn prop_quiescence_registers_everything(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut world = World::router(seed);
        for op in &ops {
            world.apply(op);
        }

        // Restore a healthy, attached router with a published prefix.
        world.registrar.clear_script();
        world.host.clear_send_faults();
        world.apply(&Operation::PromoteToRouter);
        world.apply(&Operation::AddPrefix);
        while world.deliver() {}
        world.run(40);

        prop_assert!(world.check_invariants().is_ok());
        prop_assert_eq!(world.manager.state(), meshreg_core::DuaState::Confirmed);
    }

    /// Sleepy end devices keep the invariants too.
    #[test]
    fn prop_end_device_invariants(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..80)
    ) {
        let mut world = World::sleepy_end_device(seed);

        for (i, op) in ops.iter().enumerate() {
            world.apply(op);
            if let Err(violation) = world.check_invariants() {
                prop_assert!(false, "step {}: {:?}: {}", i, op, violation);
            }
        }
    }
}

/// Operations decoded from raw bytes, as the simulator generates them.
#[test]
fn arbitrary_operations_keep_invariants() {
    for seed in 0..32u64 {
        let bytes: Vec<u8> =
            (0..2048u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8 ^ seed as u8).collect();
        let mut unstructured = Unstructured::new(&bytes);
        let mut world = World::router(seed);

        while let Ok(op) = Operation::arbitrary(&mut unstructured) {
            if unstructured.is_empty() {
                break;
            }
            world.apply(&op);
            world.check_invariants().unwrap_or_else(|v| panic!("seed {seed}: {op:?}: {v}"));
        }
    }
}

#[test]
fn model_basic_sequence() {
    let mut world = World::router(0);

    let ops = [
        Operation::AddPrefix,
        Operation::ChildAdded { slot: 0 },
        Operation::ChildAdded { slot: 1 },
        Operation::Tick { count: 0 },
        Operation::Deliver,
        Operation::Deliver,
        Operation::Deliver,
        Operation::Tick { count: 7 },
        Operation::Deliver,
        Operation::Deliver,
    ];
    for op in &ops {
        world.apply(op);
        world.check_invariants().unwrap();
    }

    assert_eq!(world.manager.state(), meshreg_core::DuaState::Confirmed);
    assert!(world.manager.proxy().is_settled());
    assert_eq!(world.manager.proxy().registered_mask().len(), 2);
}
