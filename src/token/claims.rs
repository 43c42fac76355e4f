//! Ordered claim set carried inside tokens

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CryptoError, CryptoResult};

/// Registered claim for the issue time, seconds since the Unix epoch
pub const ISSUED_AT: &str = "iat";

/// Registered claim for the expiry time, seconds since the Unix epoch
pub const EXPIRES_AT: &str = "exp";

/// A JSON object of claims that keeps insertion order
///
/// ```
/// use keyseal::token::Claims;
///
/// let mut claims = Claims::new();
/// claims.insert("sub", "user-42").insert("role", "admin");
/// assert_eq!(claims.get_str("sub"), Some("user-42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a claim, replacing any earlier value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Builder form of `insert`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn timestamp(&self, name: &str) -> Option<i64> {
        self.0
            .get(name)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.timestamp(ISSUED_AT)
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.timestamp(EXPIRES_AT)
    }

    /// Merge another claim set in, its values win on conflict
    pub fn extend(&mut self, other: &Claims) {
        for (name, value) in other.iter() {
            self.0.insert(name.clone(), value.clone());
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_json_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Parse a decrypted payload; anything but a JSON object is malformed
    pub fn from_json_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice::<Map<String, Value>>(bytes)
            .map(Self)
            .map_err(|_| CryptoError::malformed("claims are not a JSON object"))
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Claims {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
