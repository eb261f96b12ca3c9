#![no_main]

use libfuzzer_sys::fuzz_target;
use meshreg_harness::{Operation, World};

fuzz_target!(|input: (u64, Vec<Operation>)| {
    let (seed, operations) = input;
    let mut world = World::router(seed);

    for (step, operation) in operations.iter().enumerate() {
        world.apply(operation);
        if let Err(violation) = world.check_invariants() {
            panic!("step {step} {operation:?}: {violation}");
        }
    }
});
