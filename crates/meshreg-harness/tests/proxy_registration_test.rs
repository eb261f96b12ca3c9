//! Proxy registration on behalf of children.

use meshreg_core::{
    ChildAddressEvent, ChildIndex, ChildTable, DelayKind, DuaConfig, DuaState, PrimaryState,
};
use meshreg_harness::{SentNotification, SimEnv, SimHost, Verdict, World};
use meshreg_proto::{DuaNotification, DuaStatus, InterfaceIdentifier};

fn idx(slot: u16) -> ChildIndex {
    ChildIndex::new(slot).unwrap()
}

fn confirmed_router(seed: u64) -> World {
    let mut world = World::router(seed);
    world.add_prefix();
    world.run(1);
    assert_eq!(world.manager.state(), DuaState::Confirmed);
    world
}

/// Tick until a request is outstanding.
fn tick_until_sent(world: &mut World) {
    for _ in 0..10 {
        if world.host.outstanding().is_some() {
            break;
        }
        world.tick();
    }
    assert!(world.host.outstanding().is_some(), "no request within 10 ticks");
}

#[test]
fn new_child_is_registered_after_check_delay() {
    let mut world = confirmed_router(1);
    let attached_at = world.env().elapsed();
    let address = world.add_child(0).unwrap();

    assert!(world.manager.proxy().proxy_mask().contains(idx(0)));
    let check = world.manager.delays().get(DelayKind::Check);
    assert!((1..5).contains(&check), "{check}");
    assert!(world.host.is_subscribed());

    world.run(4);

    assert!(world.manager.proxy().registered_mask().contains(idx(0)));
    assert!(world.manager.proxy().is_settled());

    let sent = &world.host.sent()[1];
    assert_eq!(sent.request.target, address);
    assert_eq!(sent.request.ml_iid, InterfaceIdentifier::from(0xc0de_0000_0000_0000));
    let idle = (sent.at - attached_at).as_secs() as u32;
    assert_eq!(sent.request.last_transaction_time, Some(idle));

    assert!(world.host.notifications().is_empty());
    world.check_invariants().unwrap();
}

#[test]
fn children_register_in_slot_order() {
    let mut world = confirmed_router(2);
    let second = world.add_child(1).unwrap();
    let first = world.add_child(0).unwrap();

    world.run(4);

    let targets: Vec<_> = world.host.sent().iter().skip(1).map(|s| s.request.target).collect();
    assert_eq!(targets, vec![first, second]);
    assert!(world.manager.proxy().is_settled());
    assert_eq!(world.manager.proxy().registered_mask().len(), 2);
}

#[test]
fn only_settled_registry_schedules_check() {
    let mut world = confirmed_router(3);
    world.add_child(0);
    let check = world.manager.delays().get(DelayKind::Check);

    world.add_child(1);
    assert_eq!(world.manager.delays().get(DelayKind::Check), check);
}

#[test]
fn own_address_goes_before_children() {
    let mut world = World::router(4);
    world.add_prefix();
    world.add_child(0);

    world.run(4);

    let sent = world.host.sent();
    assert_eq!(sent[0].request.target, world.manager.domain_unicast_address().address);
    assert_eq!(sent.len(), 2);
}

#[test]
fn rejected_child_address_is_removed_and_child_notified() {
    for status in [DuaStatus::Invalid, DuaStatus::Duplicate] {
        let mut world = confirmed_router(5);
        world.registrar.push(Verdict::Status(status));
        let address = world.add_child(0).unwrap();

        world.run(4);

        assert_eq!(world.host.child(idx(0)).unwrap().domain_address, None, "{status}");
        assert!(!world.manager.proxy().proxy_mask().contains(idx(0)));
        assert_eq!(
            world.host.notifications(),
            &[SentNotification {
                notification: DuaNotification { status, target: address },
                child_rloc16: 0x0401,
            }]
        );
        // Nothing left to register.
        assert_eq!(world.host.sent().len(), 2);
        world.check_invariants().unwrap();
    }
}

#[test]
fn reregister_drops_child_but_keeps_address() {
    let mut world = confirmed_router(6);
    world.registrar.push(Verdict::Status(DuaStatus::ReRegister));
    let address = world.add_child(0).unwrap();

    world.run(4);

    assert_eq!(world.host.child(idx(0)).unwrap().domain_address, Some(address));
    assert!(world.manager.proxy().proxy_mask().is_empty());
    assert_eq!(world.host.notifications()[0].notification.status, DuaStatus::ReRegister);
    world.check_invariants().unwrap();
}

#[test]
fn transient_child_failure_notifies_and_backs_off() {
    let mut world = confirmed_router(7);
    world.registrar.push(Verdict::Status(DuaStatus::NoResources));
    let address = world.add_child(0).unwrap();

    tick_until_sent(&mut world);
    world.deliver();

    assert_eq!(
        world.host.notifications()[0].notification,
        DuaNotification { status: DuaStatus::NoResources, target: address }
    );
    let backoff = world.manager.delays().get(DelayKind::Reregistration);
    assert!((1..5).contains(&backoff), "{backoff}");
    assert!(world.manager.proxy().backoff_mask().contains(idx(0)));
    assert!(world.host.outstanding().is_none());
    assert_eq!(world.host.sent().len(), 2);
    world.check_invariants().unwrap();

    // Nothing goes out until the countdown expires.
    for _ in 1..backoff {
        world.tick();
        assert!(world.host.outstanding().is_none());
    }
    assert_eq!(world.host.sent().len(), 2);

    // Expiry re-registers the own address first, then the child.
    world.tick();
    let own = world.manager.domain_unicast_address().address;
    assert_eq!(world.host.outstanding().unwrap().request.target, own);
    assert!(world.manager.proxy().backoff_mask().is_empty());

    world.deliver();
    assert_eq!(world.host.outstanding().unwrap().request.target, address);
    world.deliver();
    assert!(world.manager.proxy().registered_mask().contains(idx(0)));
    assert_eq!(world.host.sent().len(), 4);
    world.check_invariants().unwrap();
}

#[test]
fn repeated_transient_verdicts_never_resend_without_ticks() {
    let mut world = confirmed_router(20);
    world.registrar.set_default(Verdict::Status(DuaStatus::GeneralFailure));
    let child = world.add_child(0).unwrap();
    tick_until_sent(&mut world);

    for _ in 0..20 {
        world.deliver();
    }

    assert_eq!(world.host.sent().len(), 2);
    assert_eq!(world.host.notifications().len(), 1);
    assert!(world.manager.delays().get(DelayKind::Reregistration) > 0);
    world.check_invariants().unwrap();

    let child_sends =
        |world: &World| world.host.sent().iter().filter(|s| s.request.target == child).count();

    // One retry per expired countdown, each answered with another backoff.
    for _ in 0..30 {
        let expiring = world.manager.delays().get(DelayKind::Reregistration) == 1;
        let before = child_sends(&world);
        world.tick();
        while world.deliver() {}
        assert_eq!(child_sends(&world) - before, usize::from(expiring));
        world.check_invariants().unwrap();
    }
    assert_eq!(world.host.notifications().len(), child_sends(&world));
}

#[test]
fn backed_off_child_does_not_block_other_children() {
    let mut world = confirmed_router(21);
    world.registrar.push(Verdict::Status(DuaStatus::NotPrimary));
    let first = world.add_child(0).unwrap();
    tick_until_sent(&mut world);
    world.deliver();
    assert!(world.manager.proxy().backoff_mask().contains(idx(0)));

    let second = world.add_child(1).unwrap();
    assert!(world.manager.delays().get(DelayKind::Check) > 0);
    world.perform_next_registration();
    assert_eq!(world.host.outstanding().unwrap().request.target, second);

    // The backoff countdown survives the send for the other child.
    assert!(world.manager.delays().get(DelayKind::Reregistration) > 0);
    world.deliver();
    assert!(world.host.outstanding().is_none());
    world.run(5);

    let own = world.manager.domain_unicast_address().address;
    let targets: Vec<_> = world.registrar.handled().iter().map(|r| r.target).collect();
    assert_eq!(targets, vec![own, first, second, own, first]);
    assert!(world.manager.proxy().is_settled());
    world.check_invariants().unwrap();
}

#[test]
fn own_backoff_survives_child_registration() {
    let mut world = World::router(22);
    world.registrar.push(Verdict::Status(DuaStatus::NoResources));
    world.add_prefix();
    world.run(1);
    assert_eq!(world.manager.state(), DuaState::InFlight);
    assert!(world.manager.pending().is_none());

    let child = world.add_child(0).unwrap();
    world.perform_next_registration();
    assert_eq!(world.host.outstanding().unwrap().request.target, child);
    assert!(world.manager.delays().get(DelayKind::Reregistration) > 0);
    world.deliver();

    world.run(5);
    assert_eq!(world.manager.state(), DuaState::Confirmed);
    world.check_invariants().unwrap();
}

#[test]
fn failed_notification_is_not_retried() {
    let mut world = confirmed_router(8);
    world.host.fail_notifications = true;
    world.registrar.push(Verdict::Status(DuaStatus::Invalid));
    world.add_child(0);

    world.run(4);

    assert!(world.host.notifications().is_empty());
    assert!(world.manager.proxy().proxy_mask().is_empty());
    world.run(10);
    assert!(world.host.notifications().is_empty());
}

#[test]
fn changed_child_aborts_in_flight_registration() {
    let mut world = confirmed_router(9);
    world.add_child(0);
    tick_until_sent(&mut world);

    let new_address = world.change_child(0).unwrap();

    assert_eq!(world.host.aborts(), 1);
    assert!(world.manager.pending().is_none());
    assert!(world.manager.proxy().needs_registration(idx(0)));
    assert!(world.manager.delays().get(DelayKind::Check) > 0);
    world.check_invariants().unwrap();

    world.run(4);

    assert_eq!(world.registrar.handled().last().unwrap().target, new_address);
    assert!(world.manager.proxy().registered_mask().contains(idx(0)));
}

#[test]
fn removed_child_aborts_and_forgets() {
    let mut world = confirmed_router(10);
    world.add_child(0);
    tick_until_sent(&mut world);

    world.remove_child(0);

    assert_eq!(world.host.aborts(), 1);
    assert!(world.manager.proxy().proxy_mask().is_empty());
    world.check_invariants().unwrap();

    world.run(5);
    assert_eq!(world.host.sent().len(), 2);
}

#[test]
fn removing_other_child_keeps_transaction() {
    let mut world = confirmed_router(11);
    world.add_child(0);
    world.add_child(1);
    tick_until_sent(&mut world);

    world.remove_child(1);

    assert_eq!(world.host.aborts(), 0);
    assert!(world.manager.pending().is_some());
    world.check_invariants().unwrap();
}

#[test]
fn unchanged_event_tracks_unknown_child_only() {
    let mut world = confirmed_router(12);
    let address =
        world.prefix().with_iid(&InterfaceIdentifier::from(0x0300_0000_0000_0001)).unwrap();
    world.host.attach_child(idx(2), Some(address));

    world.child_event(idx(2), ChildAddressEvent::Unchanged);
    assert!(world.manager.proxy().needs_registration(idx(2)));

    world.run(4);
    assert!(world.manager.proxy().registered_mask().contains(idx(2)));

    world.child_event(idx(2), ChildAddressEvent::Unchanged);
    assert!(world.manager.proxy().registered_mask().contains(idx(2)));
    assert!(world.manager.delays().is_idle());
}

#[test]
fn child_without_domain_address_is_skipped() {
    let mut world = confirmed_router(13);
    world.host.attach_child(idx(0), None);
    world.child_event(idx(0), ChildAddressEvent::Added);

    world.run(5);

    assert_eq!(world.host.sent().len(), 1);
    assert!(world.manager.proxy().needs_registration(idx(0)));
    world.check_invariants().unwrap();
}

#[test]
fn reregistration_covers_children() {
    let mut world = confirmed_router(14);
    let child = world.add_child(0).unwrap();
    world.run(4);
    assert_eq!(world.host.sent().len(), 2);

    world.primary_update(PrimaryState::ToTriggerRereg);
    world.run(4);

    let own = world.manager.domain_unicast_address().address;
    let targets: Vec<_> = world.host.sent().iter().map(|s| s.request.target).collect();
    assert_eq!(targets, vec![own, child, own, child]);
    assert!(world.manager.proxy().is_settled());
}

#[test]
fn prefix_refresh_forgets_children() {
    let mut world = confirmed_router(15);
    world.add_child(0);
    world.run(4);

    world.add_prefix();

    assert!(world.manager.proxy().proxy_mask().is_empty());
    assert!(world.manager.proxy().registered_mask().is_empty());
}

#[test]
fn relayed_invalid_for_child_removes_its_address() {
    let mut world = confirmed_router(16);
    let address = world.add_child(0).unwrap();
    world.run(4);

    world.notify(DuaNotification { status: DuaStatus::Invalid, target: address }, true);

    assert_eq!(world.host.acks(), 1);
    assert_eq!(world.host.child(idx(0)).unwrap().domain_address, None);
    assert!(world.manager.proxy().proxy_mask().is_empty());
    assert_eq!(world.host.notifications().len(), 1);
    world.check_invariants().unwrap();
}

#[test]
fn proxy_disabled_ignores_children() {
    let env = SimEnv::with_seed(17);
    let host = SimHost::router(env.clone());
    let mut world = World::with_host(DuaConfig::end_device(), host, env).unwrap();
    world.add_prefix();
    world.run(1);

    world.add_child(0);

    assert!(world.manager.proxy().proxy_mask().is_empty());
    assert!(world.manager.delays().is_idle());
    world.run(5);
    assert_eq!(world.host.sent().len(), 1);
}

#[test]
fn child_in_slot_three_is_selected_after_check_delay() {
    let mut world = confirmed_router(18);
    let address = world.add_child(3).unwrap();
    let check = world.manager.delays().get(DelayKind::Check);

    for _ in 1..check {
        world.tick();
    }
    assert_eq!(world.host.sent().len(), 1);

    world.tick();
    let pending = world.manager.pending().unwrap();
    assert_eq!(pending.target, meshreg_core::RegistrationTarget::Child(idx(3)));
    assert_eq!(pending.address, address);
    assert_eq!(world.host.sent()[1].request.target, address);
}

#[test]
fn reregister_verdict_for_child_is_relayed() {
    let mut world = confirmed_router(19);
    world.registrar.push(Verdict::Status(DuaStatus::ReRegister));
    let address = world.add_child(3).unwrap();

    world.run(4);

    assert_eq!(
        world.host.notifications(),
        &[SentNotification {
            notification: DuaNotification { status: DuaStatus::ReRegister, target: address },
            child_rloc16: 0x0404,
        }]
    );
}
