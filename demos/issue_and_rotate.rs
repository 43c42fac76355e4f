//! Example: Issue tokens, rotate keys and validate from a second process view
use keyseal::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    init()?;

    // Issuer and validator share one store, as two instances would share a database
    let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());
    let config = KeyManagerConfig::new(Duration::from_millis(500), Some(2));
    let issuer = asymmetric_token_service(config.clone(), store.clone())?;
    let validator = TokenService::new(Arc::new(KeyManager::validation_only(
        config,
        store,
        AsymmetricEngine::new(),
    )?));

    let token = issuer.issue(&Claims::new().with("sub", "user-42"), None)?;
    println!("Issued token of {} bytes", token.len());

    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(600));
        if issuer.manager().must_rotate_now() {
            issuer.manager().rotate_key()?;
        }
    }

    let keys = issuer.manager().public_key_set()?;
    println!("Public key set now holds {} keys", keys.len());

    // The first token's key was pruned; a fresh token validates after one refresh
    match validator.parse(&token) {
        Ok(_) => println!("Old token still valid"),
        Err(e) => println!("Old token rejected: {}", e),
    }
    let fresh = issuer.issue(&Claims::new().with("sub", "user-42"), None)?;
    let claims = validator.parse(&fresh)?;
    println!("Validated fresh token for {:?}", claims.get_str("sub"));
    Ok(())
}
