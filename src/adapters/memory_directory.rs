use crate::domain::model::{SlotId, UserRecord};
use crate::domain::ports::UserDirectory;
use crate::utils::error::{Result, SensorError};
use std::collections::HashMap;
use std::sync::RwLock;

/// User directory kept in memory, keyed by user id.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<i64, UserRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let directory = Self::new();
        for user in users {
            directory.insert(user);
        }
        directory
    }

    pub fn insert(&self, user: UserRecord) {
        let mut users = self.users.write().unwrap_or_else(|p| p.into_inner());
        users.insert(user.id, user);
    }

    pub fn get(&self, user_id: i64) -> Option<UserRecord> {
        let users = self.users.read().unwrap_or_else(|p| p.into_inner());
        users.get(&user_id).cloned()
    }
}

impl UserDirectory for InMemoryDirectory {
    fn find_by_slot(&self, slot: SlotId) -> Result<Option<UserRecord>> {
        let users = self.users.read().unwrap_or_else(|p| p.into_inner());
        Ok(users
            .values()
            .find(|u| u.active && u.slot_id == Some(slot))
            .cloned())
    }

    /// A slot belongs to one user; the previous owner loses it.
    fn assign_slot(&self, user_id: i64, slot: SlotId) -> Result<()> {
        let mut users = self.users.write().unwrap_or_else(|p| p.into_inner());
        if !users.contains_key(&user_id) {
            return Err(SensorError::UserNotFound { user_id });
        }

        for user in users.values_mut() {
            if user.id != user_id && user.slot_id == Some(slot) {
                tracing::warn!("Slot {} moved from user {} to user {}", slot, user.id, user_id);
                user.slot_id = None;
            }
        }
        if let Some(user) = users.get_mut(&user_id) {
            user.slot_id = Some(slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, slot: Option<u8>, active: bool) -> UserRecord {
        UserRecord {
            id,
            document_id: format!("DOC-{}", id),
            full_name: format!("User {}", id),
            slot_id: slot.map(|s| SlotId::new(s as i64).unwrap()),
            active,
        }
    }

    #[test]
    fn test_find_by_slot_skips_inactive_users() {
        let directory = InMemoryDirectory::with_users([user(1, Some(5), false), user(2, Some(6), true)]);

        assert!(directory.find_by_slot(SlotId::new(5).unwrap()).unwrap().is_none());
        let found = directory.find_by_slot(SlotId::new(6).unwrap()).unwrap();
        assert_eq!(found.map(|u| u.id), Some(2));
    }

    #[test]
    fn test_assign_slot_moves_ownership() {
        let directory = InMemoryDirectory::with_users([user(1, Some(9), true), user(2, None, true)]);
        let slot = SlotId::new(9).unwrap();

        directory.assign_slot(2, slot).unwrap();

        assert_eq!(directory.get(1).unwrap().slot_id, None);
        assert_eq!(directory.get(2).unwrap().slot_id, Some(slot));
    }

    #[test]
    fn test_assign_slot_unknown_user() {
        let directory = InMemoryDirectory::new();
        let result = directory.assign_slot(42, SlotId::new(1).unwrap());
        assert!(matches!(result, Err(SensorError::UserNotFound { user_id: 42 })));
    }
}
