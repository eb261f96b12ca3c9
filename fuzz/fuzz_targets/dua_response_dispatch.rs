#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use meshreg_core::{NotificationMessage, ResponseMessage};
use meshreg_harness::World;
use meshreg_proto::ResponseCode;

// Arbitrary response and notification bodies against a router with a request
// in flight.
fuzz_target!(|input: (u8, bool, Vec<u8>)| {
    let (code, as_notification, payload) = input;

    let mut world = World::router(0);
    world.add_prefix();
    world.add_child(0);
    world.run(1);
    world.tick();

    if as_notification {
        let message =
            NotificationMessage { confirmable: code & 1 == 1, payload: Bytes::from(payload) };
        world.receive_notification(&message);
    } else if world.host.take_outstanding().is_some() {
        let response =
            ResponseMessage { code: ResponseCode::from(code), payload: Bytes::from(payload) };
        world.respond(Ok(response));
    }

    if let Err(violation) = world.check_invariants() {
        panic!("{violation}");
    }
});
