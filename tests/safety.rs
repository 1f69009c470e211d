mod common;

use common::{init_logging, IncClient, IncConsistencyChecker, World};
use paxos_register::register;
use paxos_register::{Ballot, Membership, NodeId, ProposerSet, Quorum, Recoverable};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Values accepted at the same ballot on different acceptors are equal, and
/// once a value is held by a write quorum every value accepted at a higher
/// ballot derives from it.
fn assert_acceptors_agree(world: &World, write: usize) {
    let mut by_ballot: BTreeMap<(String, Ballot), (NodeId, Bytes, usize)> = BTreeMap::new();
    for id in world.network.acceptor_ids() {
        let acceptor = world.network.acceptor(id).unwrap();
        for (key, slot) in acceptor.borrow().snapshot() {
            if let Some((ballot, value)) = slot.accepted {
                assert!(slot.promised >= Some(ballot));
                let entry = by_ballot
                    .entry((key.clone(), ballot))
                    .or_insert_with(|| (id, value.clone(), 0));
                assert_eq!(
                    entry.1, value,
                    "acceptors {} and {} disagree on {} at {}",
                    entry.0, id, key, ballot
                );
                entry.2 += 1;
            }
        }
    }

    let mut chosen: BTreeMap<String, (Ballot, u64)> = BTreeMap::new();
    for ((key, ballot), (_, value, holders)) in by_ballot {
        let version = register::decode::<u64>(&value).unwrap().version;
        if let Some((at, floor)) = chosen.get(&key) {
            assert!(
                version >= *floor,
                "{} at {} has version {} below version {} chosen at {}",
                key,
                ballot,
                version,
                floor,
                at
            );
        }
        if holders >= write {
            chosen.insert(key, (ballot, version));
        }
    }
}

#[test]
fn contention_under_heavy_loss() {
    init_logging();
    for seed in 0..3 {
        let world = World::new(seed, 0.6);
        world.add_acceptors(&[0, 1, 2, 3, 4]);
        let membership = Membership::new(vec![0, 1, 2, 3, 4]).unwrap();
        let proposers = Rc::new(
            ProposerSet::build(
                &world.network,
                &membership,
                Quorum::majority(5),
                100,
                vec![(100, 0), (101, 0), (102, 0)],
            )
            .unwrap(),
        );
        let checker = IncConsistencyChecker::new();
        let ctx = world.ctx.clone();
        let c = checker.clone();
        ctx.clone()
            .block_on(async move {
                let keys = ["key1"];
                let mut clients: Vec<IncClient> = ["c1", "c2", "c3"]
                    .iter()
                    .map(|id| IncClient::spawn(&ctx, id, proposers.clone(), &keys, c.clone()))
                    .collect();
                ctx.timer().start();
                for client in &clients {
                    client.progress(&ctx, 5).await;
                }
                for client in clients.iter_mut() {
                    client.stop().await;
                }
                ctx.timer().thread().await;
            })
            .unwrap();

        checker.assert_consistent();
        assert_acceptors_agree(&world, 3);
    }
}

#[test]
fn retired_proposers_step_aside() {
    init_logging();
    let world = World::new(5, 1.0);
    world.add_acceptors(&[0, 1, 2]);
    let a3 = Membership::new(vec![0, 1, 2]).unwrap();
    let old = Rc::new(
        ProposerSet::build(&world.network, &a3, Quorum::new(2, 2), 100, vec![(100, 0)]).unwrap(),
    );
    world.add_acceptors(&[3]);
    let a4 = a3.introduce(vec![3]).unwrap().promote();
    let new = Rc::new(
        ProposerSet::build(&world.network, &a4, Quorum::new(3, 2), 100, vec![(101, 1)]).unwrap(),
    );

    let ctx = world.ctx.clone();
    ctx.timer().start();
    let res = ctx
        .clone()
        .block_on(async move {
            let p_old = old.pick(&ctx).unwrap();
            let p_new = new.pick(&ctx).unwrap();
            p_old
                .propose("k", register::update(|v: Option<u64>| v.map_or(0, |x| x + 1)))
                .await
                .unwrap();
            old.retire();
            let stale = p_old.read("k").await;
            let fresh = p_new
                .propose("k", register::update(|v: Option<u64>| v.map_or(0, |x| x + 1)))
                .await
                .unwrap();
            (stale, fresh)
        })
        .unwrap();

    assert_eq!(res.0, Err(Recoverable::StaleMembership(0).into()));
    let fresh = register::decode::<u64>(res.1.value.as_ref().unwrap()).unwrap();
    assert_eq!((fresh.version, fresh.value), (1, 1));
    assert_acceptors_agree(&world, 2);
}
