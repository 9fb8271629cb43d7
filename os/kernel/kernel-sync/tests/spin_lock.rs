use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new([None::<u64>; 4]);

    {
        let mut g = l.lock();
        g[2] = Some(0x4000);
        assert!(l.try_lock().is_none());
    }
    assert!(l.try_lock().is_some());

    let taken = l.with_lock(|slots| slots[2].take());
    assert_eq!(taken, Some(0x4000));
    assert_eq!(l.with_lock(|slots| slots.iter().flatten().count()), 0);
}

#[test]
fn try_lock_fails_while_held_and_is_not_counted() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
    assert_eq!(l.contention_count(), 0);
}

#[test]
fn uncontended_lock_does_not_count() {
    let l = SpinLock::new(0u32);
    for _ in 0..100 {
        l.with_lock(|v| *v += 1);
    }
    assert_eq!(l.with_lock(|v| *v), 100);
    assert_eq!(l.contention_count(), 0);
}

#[test]
fn waiting_for_a_holder_is_counted() {
    let l = Arc::new(SpinLock::new(0u32));
    let held = Arc::new(Barrier::new(2));

    let g = l.lock();
    let waiter = {
        let l = Arc::clone(&l);
        let held = Arc::clone(&held);
        thread::spawn(move || {
            held.wait();
            l.with_lock(|v| *v += 1);
        })
    };
    held.wait();
    // Give the waiter a chance to hit the held lock before we release it.
    while l.contention_count() == 0 {
        thread::yield_now();
    }
    drop(g);
    waiter.join().unwrap();

    assert_eq!(l.with_lock(|v| *v), 1);
    assert_eq!(l.contention_count(), 1);
}

#[test]
fn contended_pops_are_exclusive() {
    let threads = 8;
    let per_thread = 500;

    let stack: Vec<usize> = (0..threads * per_thread).collect();
    let lock = Arc::new(SpinLock::new(stack));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let lock = Arc::clone(&lock);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            let mut got = Vec::with_capacity(per_thread);
            for _ in 0..per_thread {
                let v = lock.with_lock(|s| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    let v = s.pop();
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                    v
                });
                got.push(v.expect("stack sized for every pop"));
                thread::yield_now();
            }
            got
        }));
    }

    let mut all: Vec<usize> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), threads * per_thread, "a value was popped twice");
    assert!(lock.with_lock(|s| s.is_empty()));
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");

    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(Vec::<u64>::new());
    takes_sync(&l);
}
