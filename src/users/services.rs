use tracing::{info, warn};

use crate::{
    auth::{
        password::hash_password_blocking,
        services::{require_role, validate_email, validate_password},
    },
    error::{AppError, AppResult, ADMIN_CREATE_FORBIDDEN, USER_NOT_FOUND},
};

use super::{
    dto::{UserCreate, UserUpdate},
    repo::UserStore,
    repo_types::{NewUser, Page, Role, User, UserChanges},
};

/// Registers a user.
///
/// Checks run in a fixed order: input shape, then the admin-creation rule,
/// then email uniqueness (enforced by the store on insert). While no admin
/// exists anyone may create one; after that only an admin can.
pub async fn create_user(
    store: &dyn UserStore,
    caller: Option<&User>,
    input: UserCreate,
) -> AppResult<User> {
    validate_email(&input.email)?;
    validate_password(&input.password)?;

    let role = input.role.unwrap_or_default();
    let bootstrap = match role {
        Role::User => false,
        Role::Admin => {
            if !store.admin_exists().await? {
                true
            } else if caller.is_some_and(|c| c.role == Role::Admin) {
                false
            } else {
                warn!(caller = ?caller.map(|c| c.id), "non-admin tried to create an admin");
                return Err(AppError::Forbidden(ADMIN_CREATE_FORBIDDEN));
            }
        }
    };

    let new = NewUser {
        email: input.email,
        password_hash: hash_password_blocking(input.password).await?,
        is_active: true,
        role,
    };

    let user = if bootstrap {
        let user = store.create_first_admin(new).await?;
        info!(user_id = user.id, "bootstrap admin created");
        user
    } else {
        store.create(new).await?
    };
    info!(user_id = user.id, role = %user.role, "user created");
    Ok(user)
}

/// Any authenticated principal may read any record.
pub async fn get_user(store: &dyn UserStore, _principal: &User, id: i64) -> AppResult<User> {
    store
        .get_by_id(id)
        .await?
        .ok_or(AppError::NotFound(USER_NOT_FOUND))
}

pub async fn list_users(store: &dyn UserStore, principal: &User, page: Page) -> AppResult<Vec<User>> {
    require_role(principal, Role::Admin)?;
    Ok(store.list(page).await?)
}

/// Serves both PUT and PATCH; only fields present in `input` change.
pub async fn update_user(
    store: &dyn UserStore,
    principal: &User,
    id: i64,
    input: UserUpdate,
) -> AppResult<User> {
    require_role(principal, Role::Admin)?;

    if let Some(email) = &input.email {
        validate_email(email)?;
    }
    let password_hash = match input.password {
        Some(pw) => {
            validate_password(&pw)?;
            Some(hash_password_blocking(pw).await?)
        }
        None => None,
    };

    let user = store
        .update(
            id,
            UserChanges {
                email: input.email,
                password_hash,
                is_active: input.is_active,
                role: input.role,
            },
        )
        .await?;
    info!(user_id = user.id, by = principal.id, "user updated");
    Ok(user)
}

/// Hard delete. Tokens already issued to the user stop resolving once the
/// record is gone.
pub async fn delete_user(store: &dyn UserStore, principal: &User, id: i64) -> AppResult<()> {
    require_role(principal, Role::Admin)?;
    store.delete(id).await?;
    info!(user_id = id, by = principal.id, "user deleted");
    Ok(())
}

/// Creates an admin account for `email` unless that email is already taken.
/// Returns `None` when a user with the email exists, whatever its role.
pub async fn ensure_admin(store: &dyn UserStore, email: &str, password: &str) -> AppResult<Option<User>> {
    validate_email(email)?;
    validate_password(password)?;

    if store.get_by_email(email).await?.is_some() {
        return Ok(None);
    }
    let new = NewUser {
        email: email.to_string(),
        password_hash: hash_password_blocking(password.to_string()).await?,
        is_active: true,
        role: Role::Admin,
    };
    let user = store.create(new).await?;
    info!(user_id = user.id, "admin created");
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::password::verify_password,
        error::{ADMIN_ONLY, EMAIL_TAKEN},
        users::memory::MemoryUserStore,
    };

    fn create_req(email: &str, role: Option<Role>) -> UserCreate {
        UserCreate {
            email: email.into(),
            password: "strongpassword".into(),
            role,
        }
    }

    #[tokio::test]
    async fn plain_user_needs_no_caller() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, None, create_req("a@x.com", None)).await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert_ne!(user.password_hash, "strongpassword");
        assert!(verify_password("strongpassword", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryUserStore::new();
        create_user(&store, None, create_req("a@x.com", None)).await.unwrap();
        let err = create_user(&store, None, create_req("a@x.com", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(EMAIL_TAKEN)));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let store = MemoryUserStore::new();
        let bad_email = create_user(&store, None, create_req("not-an-email", None)).await;
        assert!(matches!(bad_email, Err(AppError::Validation(_))));

        let mut short = create_req("a@x.com", None);
        short.password = "short".into();
        assert!(matches!(
            create_user(&store, None, short).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_bootstrap_window() {
        let store = MemoryUserStore::new();
        let admin = create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);

        let err = create_user(&store, None, create_req("root2@x.com", Some(Role::Admin)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ADMIN_CREATE_FORBIDDEN)));

        let second = create_user(&store, Some(&admin), create_req("root2@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        assert_eq!(second.role, Role::Admin);
    }

    #[tokio::test]
    async fn regular_user_cannot_create_admin() {
        let store = MemoryUserStore::new();
        create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        let user = create_user(&store, None, create_req("u@x.com", None)).await.unwrap();
        let err = create_user(&store, Some(&user), create_req("new@x.com", Some(Role::Admin)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ADMIN_CREATE_FORBIDDEN)));
    }

    #[tokio::test]
    async fn authorization_is_checked_before_uniqueness() {
        let store = MemoryUserStore::new();
        create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        // both would fail; the admin rule wins
        let err = create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_only_operations_forbid_users() {
        let store = MemoryUserStore::new();
        let user = create_user(&store, None, create_req("u@x.com", None)).await.unwrap();

        assert!(matches!(
            list_users(&store, &user, Page::default()).await,
            Err(AppError::Forbidden(ADMIN_ONLY))
        ));
        assert!(matches!(
            update_user(&store, &user, user.id, UserUpdate::default()).await,
            Err(AppError::Forbidden(ADMIN_ONLY))
        ));
        assert!(matches!(
            delete_user(&store, &user, user.id).await,
            Err(AppError::Forbidden(ADMIN_ONLY))
        ));
        // forbidden is reported even for ids that do not exist
        assert!(matches!(
            delete_user(&store, &user, 999).await,
            Err(AppError::Forbidden(ADMIN_ONLY))
        ));
    }

    #[tokio::test]
    async fn admin_updates_and_deletes() {
        let store = MemoryUserStore::new();
        let admin = create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        let user = create_user(&store, None, create_req("u@x.com", None)).await.unwrap();

        let updated = update_user(
            &store,
            &admin,
            user.id,
            UserUpdate {
                password: Some("newpassword".into()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.email, "u@x.com");
        assert!(verify_password("newpassword", &updated.password_hash));
        assert!(!verify_password("strongpassword", &updated.password_hash));

        let listed = list_users(&store, &admin, Page::default()).await.unwrap();
        assert_eq!(listed.len(), 2);

        delete_user(&store, &admin, user.id).await.unwrap();
        assert!(matches!(
            get_user(&store, &admin, user.id).await,
            Err(AppError::NotFound(USER_NOT_FOUND))
        ));
        assert!(matches!(
            delete_user(&store, &admin, user.id).await,
            Err(AppError::NotFound(USER_NOT_FOUND))
        ));
        assert!(matches!(
            update_user(&store, &admin, user.id, UserUpdate::default()).await,
            Err(AppError::NotFound(USER_NOT_FOUND))
        ));
    }

    #[tokio::test]
    async fn update_validates_new_values() {
        let store = MemoryUserStore::new();
        let admin = create_user(&store, None, create_req("root@x.com", Some(Role::Admin)))
            .await
            .unwrap();
        let bad = update_user(
            &store,
            &admin,
            admin.id,
            UserUpdate {
                password: Some("short".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn ensure_admin_is_idempotent_per_email() {
        let store = MemoryUserStore::new();
        let admin = ensure_admin(&store, "root@x.com", "adminpassword")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(store.admin_exists().await.unwrap());

        assert!(ensure_admin(&store, "root@x.com", "otherpassword")
            .await
            .unwrap()
            .is_none());

        // a second admin with a fresh email is allowed
        assert!(ensure_admin(&store, "ops@x.com", "adminpassword")
            .await
            .unwrap()
            .is_some());

        assert!(matches!(
            ensure_admin(&store, "bad", "adminpassword").await,
            Err(AppError::Validation(_))
        ));
    }
}
