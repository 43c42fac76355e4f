#![no_main]

use arbitrary::Arbitrary;
use keyseal::engine::Envelope;
use keyseal::prelude::*;
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

#[derive(Arbitrary, Debug)]
struct TokenFuzzInput {
    token: String,
    flip: Option<(usize, u8)>,
    payload: Vec<u8>,
}

fn services() -> &'static (TokenService<SymmetricEngine>, TokenService<AsymmetricEngine>) {
    static SERVICES: OnceLock<(TokenService<SymmetricEngine>, TokenService<AsymmetricEngine>)> =
        OnceLock::new();
    SERVICES.get_or_init(|| {
        let config = KeyManagerConfig::new(Duration::from_secs(3600), Some(2));
        (
            symmetric_token_service(config.clone(), Arc::new(InMemoryKeyStore::new())).unwrap(),
            asymmetric_token_service(config, Arc::new(InMemoryKeyStore::new())).unwrap(),
        )
    })
}

fuzz_target!(|input: TokenFuzzInput| {
    let (symmetric, asymmetric) = services();

    // Arbitrary strings must never panic the parsers
    let _ = Envelope::parse(&input.token);
    let _ = symmetric.parse(&input.token);
    let _ = asymmetric.parse(&input.token);

    // A mutated genuine token must never decrypt to a different payload
    if let Ok(token) = symmetric.manager().encrypt(&input.payload, &EncryptOptions::new()) {
        if let Some((offset, mask)) = input.flip.filter(|(_, mask)| *mask != 0) {
            let mut bytes = token.into_bytes();
            let index = offset % bytes.len();
            bytes[index] ^= mask;
            if let Ok(mutated) = String::from_utf8(bytes) {
                if let Ok(plaintext) = symmetric.manager().decrypt(&mutated) {
                    assert_eq!(plaintext, input.payload);
                }
            }
        }
    }
});
