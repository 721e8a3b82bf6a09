use sovran_attrmap::{Channel, Emitter, Key, Observable, ValueStore, ValueUpdate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_default_supplier_runs_once() {
    const THREADS: usize = 8;

    let store = Arc::new(ValueStore::new());
    let key = Key::<String>::register();
    let calls = Arc::new(AtomicUsize::new(0));
    let emissions = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&emissions);
    let _sub = store
        .observe(&ValueStore::CHANGED, move |_: &ValueUpdate| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .get_or_insert_with(&key, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        format!("made by {}", i)
                    })
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(emissions.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r == &results[0]));
    assert_eq!(store.get(&key).unwrap().as_ref(), Some(&results[0]));
}

#[test]
fn test_concurrent_get_or_insert_emits_once() {
    const THREADS: usize = 6;

    let store = Arc::new(ValueStore::new());
    let key = Key::<usize>::register();
    let emissions = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&emissions);
    let _sub = store
        .observe_key(&key, move |_: Option<&usize>| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let key = key.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get_or_insert(&key, i).unwrap()
            })
        })
        .collect();

    let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|r| *r == results[0]));
    assert_eq!(emissions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_updates_are_not_lost() {
    const THREADS: usize = 8;
    const ROUNDS: u64 = 250;

    let store = Arc::new(ValueStore::new());
    let hits = Key::<u64>::register();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let hits = hits.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    store
                        .get_and_update(&hits, |v| Some(v.unwrap_or(0) + 1))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get(&hits).unwrap(), Some(THREADS as u64 * ROUNDS));
}

#[test]
fn test_slow_supplier_does_not_block_other_keys() {
    let store = Arc::new(ValueStore::new());
    let slow = Key::<bool>::register();
    let fast = Key::<u8>::register();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();

    let worker = {
        let store = Arc::clone(&store);
        let slow = slow.clone();
        thread::spawn(move || {
            store
                .get_or_insert_with(&slow, || {
                    entered_tx.send(()).unwrap();
                    // Holds the slot until the other key has been written
                    done_rx.recv_timeout(Duration::from_secs(5)).is_ok()
                })
                .unwrap()
        })
    };

    entered_rx.recv().unwrap();
    store.set(&fast, 1).unwrap();
    assert_eq!(store.get(&fast).unwrap(), Some(1));
    done_tx.send(()).unwrap();

    assert!(worker.join().unwrap());
    assert_eq!(store.get(&slow).unwrap(), Some(true));
}

#[test]
fn test_emission_after_cancel_from_another_thread() {
    let emitter = Emitter::new();
    let channel = Channel::<u32>::register();
    let count = Arc::new(AtomicUsize::new(0));

    let sink = Arc::clone(&count);
    let sub = emitter
        .subscribe(&channel, move |_: &u32| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    emitter.emit(&channel, &1).unwrap();
    thread::spawn(move || sub.cancel().unwrap()).join().unwrap();

    let before = count.load(Ordering::SeqCst);
    let producers: Vec<_> = (0..4)
        .map(|n| {
            let emitter = emitter.clone();
            let channel = channel.clone();
            thread::spawn(move || emitter.emit(&channel, &n).unwrap())
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(before, 1);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_subscribe_and_emit() {
    const THREADS: usize = 4;

    let emitter = Emitter::new();
    let channel = Channel::<u32>::register();
    let count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let emitter = emitter.clone();
            let channel = channel.clone();
            let count = Arc::clone(&count);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let sink = Arc::clone(&count);
                let sub = emitter
                    .subscribe(&channel, move |_: &u32| {
                        sink.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                barrier.wait();
                sub
            })
        })
        .collect();

    let subs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    emitter.emit(&channel, &0).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), THREADS);

    for sub in &subs {
        sub.cancel().unwrap();
    }
    assert_eq!(emitter.subscriber_count(channel.id()).unwrap(), 0);
}
