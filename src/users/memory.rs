use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, Page, Role, User, UserChanges},
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn insert(&mut self, new: NewUser) -> User {
        self.next_id += 1;
        let user = User {
            id: self.next_id,
            email: new.email,
            password_hash: new.password_hash.into_string(),
            is_active: new.is_active,
            role: new.role,
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.insert(user.id, user.clone());
        user
    }
}

/// In-process store. Every check-and-write runs under a single write guard,
/// which is what keeps emails unique under concurrent callers.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&new.email, None) {
            return Err(StoreError::Conflict);
        }
        Ok(inner.insert(new))
    }

    async fn create_first_admin(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.role == Role::Admin) {
            return Err(StoreError::AdminExists);
        }
        if inner.email_taken(&new.email, None) {
            return Err(StoreError::Conflict);
        }
        Ok(inner.insert(NewUser {
            role: Role::Admin,
            ..new
        }))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self, page: Page) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if let Some(email) = &changes.email {
            if inner.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict);
            }
        }
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(digest) = changes.password_hash {
            user.password_hash = digest.into_string();
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn admin_exists(&self) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().any(|u| u.role == Role::Admin))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::password::hash_password;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: hash_password("strongpassword").unwrap(),
            is_active: true,
            role,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@x.com", Role::User)).await.unwrap();
        let b = store.create(new_user("b@x.com", Role::User)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.is_active);
        assert!(a.password_hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@x.com", Role::User)).await.unwrap();
        let err = store.create(new_user("a@x.com", Role::Admin)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        // exact comparison, case is preserved
        store.create(new_user("A@x.com", Role::User)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_with_same_email_admit_one() {
        let store = Arc::new(MemoryUserStore::new());
        let digest = hash_password("strongpassword").unwrap();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let new = NewUser {
                email: "race@x.com".into(),
                password_hash: digest.clone(),
                is_active: true,
                role: Role::User,
            };
            handles.push(tokio::spawn(async move { store.create(new).await }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StoreError::Conflict) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn lookups_by_id_and_email() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@x.com", Role::User)).await.unwrap();
        assert_eq!(store.get_by_id(a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(store.get_by_email("a@x.com").await.unwrap(), Some(a));
        assert_eq!(store.get_by_id(99).await.unwrap(), None);
        assert_eq!(store.get_by_email("nobody@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_pages_in_id_order() {
        let store = MemoryUserStore::new();
        for i in 0..5 {
            store
                .create(new_user(&format!("u{i}@x.com"), Role::User))
                .await
                .unwrap();
        }
        let page = store.list(Page { offset: 1, limit: 2 }).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![2, 3]);
        let tail = store.list(Page { offset: 4, limit: 10 }).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert!(store.list(Page { offset: 10, limit: 10 }).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_touches_only_given_fields() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@x.com", Role::User)).await.unwrap();
        let updated = store
            .update(
                a.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.email, a.email);
        assert_eq!(updated.password_hash, a.password_hash);
        assert_eq!(updated.role, a.role);
        assert_eq!(updated.created_at, a.created_at);
    }

    #[tokio::test]
    async fn update_rejects_taken_email_and_missing_id() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@x.com", Role::User)).await.unwrap();
        store.create(new_user("b@x.com", Role::User)).await.unwrap();
        let err = store
            .update(
                a.id,
                UserChanges {
                    email: Some("b@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        // keeping its own email is not a conflict
        store
            .update(
                a.id,
                UserChanges {
                    email: Some("a@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = store.update(99, UserChanges::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_is_hard() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@x.com", Role::User)).await.unwrap();
        store.delete(a.id).await.unwrap();
        assert_eq!(store.get_by_id(a.id).await.unwrap(), None);
        assert!(matches!(store.delete(a.id).await, Err(StoreError::NotFound)));
        // email is free again
        store.create(new_user("a@x.com", Role::User)).await.unwrap();
    }

    #[tokio::test]
    async fn first_admin_window_closes() {
        let store = MemoryUserStore::new();
        assert!(!store.admin_exists().await.unwrap());
        let admin = store
            .create_first_admin(new_user("root@x.com", Role::User))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(store.admin_exists().await.unwrap());
        let err = store
            .create_first_admin(new_user("root2@x.com", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AdminExists));
    }
}
