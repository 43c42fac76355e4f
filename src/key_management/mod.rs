/*!
 * Key management for token keys
 *
 * This module holds key records, the stores that persist them and the
 * manager that rotates them and keeps a bounded history of retired keys.
 */

pub mod manager;
pub mod record;
pub mod split_store;
#[cfg(feature = "sql-store")]
pub mod sql_store;
pub mod store;


pub use manager::KeyManager;
pub use manager::ManagerMode;
pub use record::AsymmetricKeyPair;
pub use record::KeyMaterial;
pub use record::KeyRecord;
pub use record::KeyScheme;
pub use record::PublicKeyEntry;
pub use record::PublicKeySet;
pub use record::StoredKey;
pub use record::{AGREEMENT_ALGORITHM, SECRET_KEY_SIZE, SIGNATURE_ALGORITHM};
pub use split_store::InMemorySplitStore;
pub use split_store::SplitKeyStore;
pub use split_store::SplitStoreAdapter;
#[cfg(feature = "sql-store")]
pub use sql_store::SqlKeyStore;
pub use store::InMemoryKeyStore;
pub use store::KeyStore;
