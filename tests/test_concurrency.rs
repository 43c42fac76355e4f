// Readers and rotation writers sharing one key manager

use keyseal::engine::Envelope;
use keyseal::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_readers_never_observe_missing_key_during_rotation() {
    let manager = Arc::new(
        KeyManager::new_issuer(
            KeyManagerConfig::new(Duration::from_secs(3600), Some(64)),
            Arc::new(InMemoryKeyStore::new()),
            SymmetricEngine::new(),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for worker in 0..4 {
        let manager = Arc::clone(&manager);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let payload = format!("worker {} message {}", worker, i);
                let token = manager.encrypt(payload.as_bytes(), &EncryptOptions::new()).unwrap();
                assert_eq!(manager.decrypt(&token).unwrap(), payload.as_bytes());
                assert!(manager.active_key().is_some());
            }
        }));
    }

    let rotator = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for _ in 0..20 {
                manager.rotate_key().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    rotator.join().unwrap();

    assert_eq!(manager.history().len(), 20);
    let active = manager.active_key().unwrap();
    assert!(manager.history().iter().all(|r| r.id() != active.id()));
}

#[test]
fn test_concurrent_rotate_if_needed_rotates_once() {
    let manager = Arc::new(
        KeyManager::new_issuer(
            KeyManagerConfig::new(Duration::from_millis(100), None),
            Arc::new(InMemoryKeyStore::new()),
            SymmetricEngine::new(),
        )
        .unwrap(),
    );
    thread::sleep(Duration::from_millis(150));
    assert!(manager.must_rotate_now());

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let rotations = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let rotations = Arc::clone(&rotations);
            thread::spawn(move || {
                barrier.wait();
                if manager.rotate_if_needed().unwrap() {
                    rotations.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(rotations.load(Ordering::SeqCst), 1);
    assert_eq!(manager.history().len(), 1);
}

#[test]
fn test_token_service_is_shareable_across_threads() {
    let service = Arc::new(
        asymmetric_token_service(KeyManagerConfig::default(), Arc::new(InMemoryKeyStore::new()))
            .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let token = service.issue(&Claims::new().with("n", n), None).unwrap();
                service.parse(&token).unwrap().get("n").and_then(|v| v.as_i64())
            })
        })
        .collect();

    let mut seen: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    seen.sort();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn test_nested_token_uses_one_key_during_rotation() {
    let manager = Arc::new(
        KeyManager::new_issuer(
            KeyManagerConfig::new(Duration::from_secs(3600), None),
            Arc::new(InMemoryKeyStore::new()),
            AsymmetricEngine::new(),
        )
        .unwrap(),
    );
    let service = TokenService::new(Arc::clone(&manager));

    let rotator = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            for _ in 0..100 {
                manager.rotate_key().unwrap();
            }
        })
    };

    for n in 0..100 {
        let token = service.issue(&Claims::new().with("n", n), None).unwrap();
        let outer_kid = Envelope::parse(&token).unwrap().kid().unwrap().to_string();

        let signed = String::from_utf8(manager.decrypt(&token).unwrap()).unwrap();
        let jws_header = signed.split('.').next().unwrap();
        let jws_header: serde_json::Value =
            serde_json::from_slice(&keyseal::utils::b64_decode(jws_header, "header").unwrap())
                .unwrap();
        assert_eq!(jws_header["kid"], outer_kid.as_str());
    }
    rotator.join().unwrap();
}

#[test]
fn test_refresh_racing_rotation_keeps_newest_key() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = Arc::new(
        KeyManager::new_issuer(
            KeyManagerConfig::new(Duration::from_secs(3600), Some(128)),
            store.clone(),
            SymmetricEngine::new(),
        )
        .unwrap(),
    );

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..25 {
                    if worker % 2 == 0 {
                        manager.rotate_key().unwrap();
                    } else {
                        manager.refresh().unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored: Vec<String> = store
        .get_all_keys()
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(stored.len(), 51);
    assert_eq!(manager.active_key().unwrap().id(), stored[0]);

    let history: Vec<String> = manager.history().iter().map(|r| r.id().to_string()).collect();
    assert_eq!(history, stored[1..].to_vec());
}
