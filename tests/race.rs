use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Barrier;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use slotguard::notify::NotifyHub;
use slotguard::{Engine, EngineError, Interval, Ms, Reservation, Status};

const T0: Ms = 1_768_435_200_000; // 2026-01-15T00:00:00Z
const M: Ms = 60_000; // 1 minute in ms

// ── Test infrastructure ──────────────────────────────────────

fn start_engine() -> (Arc<Engine>, PathBuf) {
    let dir = std::env::temp_dir().join(format!("slotguard_race_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("journal.wal");
    let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
    (Arc::new(engine), path)
}

fn minutes(from: Ms, to: Ms) -> Interval {
    Interval::new(T0 + from * M, T0 + to * M).unwrap()
}

/// Live reservations on one resource never overlap.
fn assert_disjoint(live: &[Reservation]) {
    for (i, a) in live.iter().enumerate() {
        assert!(a.is_live());
        for b in &live[i + 1..] {
            assert!(
                !a.interval.overlaps(&b.interval),
                "{} {} overlaps {} {}",
                a.id,
                a.interval,
                b.id,
                b.interval
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn identical_requests_race_to_one_winner() {
    let (engine, _) = start_engine();
    let n = 64;
    let barrier = Arc::new(Barrier::new(n));

    let attempts = (0..n).map(|i| {
        let engine = engine.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            engine
                .try_reserve("room-1", &format!("user-{i}"), minutes(600, 660))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<&Reservation> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in &results {
        if let Err(e) = result {
            assert!(e.is_conflict(), "unexpected error {e}");
        }
    }
    assert_eq!(engine.list_active("room-1").await, vec![winners[0].clone()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parked_submissions_all_contest_one_holder() {
    let (engine, _) = start_engine();
    let n = 32;
    let barrier = Arc::new(Barrier::new(n));

    let attempts = (0..n).map(|i| {
        let engine = engine.clone();
        let barrier = barrier.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            engine
                .submit_reservation("room-1", &format!("user-{i}"), minutes(0, 90))
                .await
        })
    });
    let mut admitted = 0;
    let mut parked = Vec::new();
    for joined in join_all(attempts).await {
        match joined.unwrap() {
            Ok(_) => admitted += 1,
            Err(EngineError::Conflict {
                request: Some(id), ..
            }) => parked.push(id),
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(parked.len(), n - 1);
    assert_eq!(engine.list_contested("room-1").await.len(), n - 1);

    // Approvers race too: only one override can hold at a time, and the
    // ledger ends up with exactly one live reservation.
    let overrides = parked.iter().map(|id| {
        let engine = engine.clone();
        let id = *id;
        tokio::spawn(async move { engine.approve(id, true).await })
    });
    for joined in join_all(overrides).await {
        let _ = joined.unwrap();
    }
    let live = engine.list_active("room-1").await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].status, Status::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn random_load_never_double_books() {
    let (engine, path) = start_engine();
    let resources = ["desk-1", "desk-2"];

    let workers = (0..16u64).map(|w| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut seed = w.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
            let mut next = move || {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                (seed % 1_000_000) as Ms
            };
            let mut held: Vec<Ulid> = Vec::new();
            for _ in 0..60 {
                let resource = resources[(next() % 2) as usize];
                let start = next() % 480;
                let interval = minutes(start, start + 15 + next() % 60);
                match next() % 5 {
                    0 | 1 => {
                        if let Ok(r) = engine.try_reserve(resource, "w", interval).await {
                            held.push(r.id);
                        }
                    }
                    2 => {
                        if let Err(EngineError::Conflict {
                            request: Some(id), ..
                        }) = engine.submit_reservation(resource, "w", interval).await
                        {
                            let _ = engine.approve(id, true).await;
                        }
                    }
                    3 if !held.is_empty() => {
                        let id = held.remove((next() as usize) % held.len());
                        let _ = engine.cancel(id, "released").await;
                    }
                    _ => {
                        if let Some(id) = held.last() {
                            let _ = engine.approve(*id, false).await;
                        }
                    }
                }
            }
        })
    });
    for joined in join_all(workers).await {
        joined.unwrap();
    }

    let replayed = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    for resource in resources {
        let live = engine.list_active(resource).await;
        assert_disjoint(&live);
        assert_eq!(replayed.list_active(resource).await, live);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn separate_resources_do_not_contend() {
    let (engine, _) = start_engine();
    let n = 50;

    let attempts = (0..n).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .try_reserve(&format!("room-{i}"), "alice", minutes(0, 60))
                .await
        })
    });
    for joined in join_all(attempts).await {
        assert_ok!(joined.unwrap());
    }
    assert_eq!(engine.list_resources().len(), n);
}

#[tokio::test]
async fn failed_override_changes_nothing() {
    let (engine, _) = start_engine();
    let a = engine.try_reserve("room-1", "alice", minutes(0, 60)).await.unwrap();
    let a = engine.approve(a.id, false).await.unwrap();
    let b = engine.try_reserve("room-1", "bob", minutes(60, 120)).await.unwrap();
    let b = engine.approve(b.id, false).await.unwrap();

    let request = match engine
        .submit_reservation("room-1", "carol", minutes(30, 90))
        .await
    {
        Err(EngineError::Conflict {
            request: Some(id), ..
        }) => id,
        other => panic!("expected parked conflict, got {other:?}"),
    };
    let b = engine.cancel(b.id, "gone").await.unwrap();

    assert_err!(engine.approve_displacing(request, &[a.id, b.id]).await);
    assert_eq!(engine.get_reservation(a.id).await.unwrap(), a);
    assert_eq!(engine.get_reservation(b.id).await.unwrap(), b);
    assert_eq!(
        engine.get_reservation(request).await.unwrap().status,
        Status::Pending
    );
}
