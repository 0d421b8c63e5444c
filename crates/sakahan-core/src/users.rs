//! # Users
//!
//! Identity comes from the external token service; the engine only keeps a
//! profile copy of every user it has seen so listings can show authors.

use crate::error::Result;
use crate::primitives::UserId;
use crate::storage::{Reader, WriteTx};
use crate::types::User;

/// Insert or refresh the stored profile of a user.
pub fn remember(tx: &mut WriteTx, user: &User) -> Result<()> {
    match tx.get::<User>(user.id.0)? {
        Some(stored) if stored == *user => Ok(()),
        Some(_) => {
            tx.put(user)?;
            tracing::debug!(user = %user.id, "refreshed user profile");
            Ok(())
        }
        None => {
            tx.put(user)?;
            tracing::info!(user = %user.id, email = %user.email, "recorded new user");
            Ok(())
        }
    }
}

/// Fetch a stored profile.
pub fn get(r: &impl Reader, id: UserId) -> Result<Option<User>> {
    r.get::<User>(id.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::Role;

    #[test]
    fn remember_upserts_profile() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| unreachable!("tempdir: {e}"));
        let store = Store::open(dir.path().join("users.redb"))
            .unwrap_or_else(|e| unreachable!("open: {e}"));

        let mut user = User {
            id: UserId(7),
            email: "ana@example.org".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Reyes".to_string(),
            role: Role::Contributor,
        };
        assert!(store.write(|tx| remember(tx, &user)).is_ok());

        user.role = Role::Administrator;
        assert!(store.write(|tx| remember(tx, &user)).is_ok());

        let stored = store.read(|tx| get(tx, UserId(7))).ok().flatten();
        assert_eq!(stored.map(|u| u.role), Some(Role::Administrator));
        assert_eq!(store.read(|tx| tx.count::<User>()).ok(), Some(1));
    }
}
