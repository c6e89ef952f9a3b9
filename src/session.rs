use serde::{Deserialize, Serialize};

use crate::store::{self, LocalStore, StoreError, USER_KEY};

/// Signed-in identity handed to the feed at mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
}

/// Shape of the stored `user` object. Only `username` is read; anything
/// else written by other surfaces is kept untouched.
#[derive(Serialize, Deserialize)]
struct StoredUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Resolves the session from persisted state. `None` unless a non-empty
    /// `username` is present.
    pub fn load(store: &dyn LocalStore) -> Option<Self> {
        let user: StoredUser = store::read_json(store, USER_KEY)?;

        user.username.filter(|u| !u.is_empty()).map(Self::new)
    }

    /// Persists `username` as the signed-in user.
    pub fn establish(store: &mut dyn LocalStore, username: &str) -> Result<Self, StoreError> {
        let mut user: StoredUser = store::read_json(store, USER_KEY).unwrap_or(StoredUser {
            username: None,
            rest: Default::default(),
        });
        user.username = Some(username.to_owned());
        store::write_json(store, USER_KEY, &user)?;

        Ok(Self::new(username))
    }

    pub fn clear(store: &mut dyn LocalStore) -> Result<(), StoreError> {
        store.remove(USER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn missing_user_is_no_session() {
        let store = MemoryStore::new();
        assert_eq!(Session::load(&store), None);
    }

    #[test]
    fn empty_or_absent_username_is_no_session() {
        let mut store = MemoryStore::new();

        store.set(USER_KEY, r#"{"username": ""}"#.to_owned()).unwrap();
        assert_eq!(Session::load(&store), None);

        store.set(USER_KEY, r#"{"email": "a@b.c"}"#.to_owned()).unwrap();
        assert_eq!(Session::load(&store), None);

        store.set(USER_KEY, "not json".to_owned()).unwrap();
        assert_eq!(Session::load(&store), None);
    }

    #[test]
    fn establish_keeps_other_fields_and_clear_removes() {
        let mut store = MemoryStore::new();
        store
            .set(USER_KEY, r#"{"username": "old", "email": "a@b.c"}"#.to_owned())
            .unwrap();

        let session = Session::establish(&mut store, "alice").unwrap();
        assert_eq!(session.username(), "alice");
        assert_eq!(Session::load(&store), Some(Session::new("alice")));
        let raw: serde_json::Value = store::read_json(&store, USER_KEY).unwrap();
        assert_eq!(raw["email"], "a@b.c");

        Session::clear(&mut store).unwrap();
        assert_eq!(Session::load(&store), None);
    }
}
