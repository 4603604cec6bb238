use std::sync::Arc;

use chrono::Utc;

use crate::backend::{DocumentStore, IdentityProvider, Session};
use crate::error::{Result, ServerError};
use crate::user::{NewUser, Profile, ProfilePatch, UserQuery, UserRepository};

/// User manager.
///
/// Accounts live in the identity provider, profiles in the document
/// store. Only profiles are edited here.
#[derive(Clone)]
pub struct UserService {
    pub repo: UserRepository,
    identity: Arc<dyn IdentityProvider>,
}

fn not_found(uid: &str) -> ServerError {
    ServerError::NotFound {
        resource: "user",
        id: uid.to_owned(),
    }
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            repo: UserRepository::new(store),
            identity,
        }
    }

    pub async fn list(&self, query: &UserQuery) -> Result<Vec<Profile>> {
        Ok(query.apply(self.repo.list().await?))
    }

    /// Create the account, then its profile.
    pub async fn create(&self, user: NewUser) -> Result<Profile> {
        let account = self
            .identity
            .create_account(&user.email, &user.password)
            .await?;

        let profile = Profile {
            uid: account.uid,
            email: user.email.trim().to_owned(),
            display_name: user.display_name,
            role: user.role,
            status: user.status,
            created_at: Utc::now(),
            last_login: None,
        };
        self.repo.insert(&profile).await?;

        tracing::info!(uid = %profile.uid, role = profile.role.as_str(), "user created");
        Ok(profile)
    }

    /// Merge `patch` into the profile of `uid`.
    pub async fn update(&self, uid: &str, patch: &ProfilePatch) -> Result<Profile> {
        if self.repo.find_by_id(uid).await?.is_none() {
            return Err(not_found(uid));
        }

        self.repo.update(uid, patch).await?;
        self.repo.find_by_id(uid).await?.ok_or_else(|| not_found(uid))
    }

    /// Delete the profile of `uid`.
    ///
    /// The account itself is only deleted when it is the caller's own.
    pub async fn delete(&self, uid: &str, caller: &Session) -> Result<()> {
        if caller.account.uid == uid {
            self.identity.delete_current(caller).await?;
        } else {
            tracing::debug!(%uid, "account kept, not the current session");
        }

        self.repo.delete(uid).await?;
        tracing::info!(%uid, "user deleted");
        Ok(())
    }

    /// Change the password of the caller.
    pub async fn change_password(&self, caller: &Session, password: &str) -> Result<()> {
        self.identity.update_password(caller, password).await?;
        tracing::info!(uid = %caller.account.uid, "password changed");
        Ok(())
    }

    /// Record a sign-in on the caller's profile, when there is one.
    pub async fn touch_last_login(&self, session: &Session) -> Result<()> {
        let uid = &session.account.uid;
        if self.repo.find_by_id(uid).await?.is_some() {
            self.repo.touch_last_login(uid, session.signed_in_at).await?;
        }
        Ok(())
    }
}
