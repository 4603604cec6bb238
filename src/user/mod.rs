mod repository;
mod service;

pub use repository::*;
pub use service::*;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

const ALL: &str = "all";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "inactive" => Ok(Status::Inactive),
            "suspended" => Ok(Status::Suspended),
            _ => Err(()),
        }
    }
}

/// Profile as saved on database, keyed by the identity-provider uid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// Body of a user creation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[validate(email(message = "Adresse email invalide."))]
    pub email: String,
    #[validate(length(min = 6, message = "Le mot de passe doit contenir au moins 6 caractères."))]
    pub password: String,
    #[validate(length(min = 1, message = "Le nom d'affichage est obligatoire."))]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: Status,
}

/// Profile fields to change. Missing fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Adresse email invalide."))]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Le nom d'affichage est obligatoire."))]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

/// List filters. `all`, blank or missing disables a filter.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

fn selected<T: FromStr>(value: Option<&str>) -> Option<Result<T, T::Err>> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != ALL)
        .map(T::from_str)
}

impl UserQuery {
    /// Whether `profile` passes every filter.
    pub fn matches(&self, profile: &Profile) -> bool {
        let term = self.search.as_deref().unwrap_or_default().to_lowercase();
        let matches_search = profile.display_name.to_lowercase().contains(&term)
            || profile.email.to_lowercase().contains(&term);

        // unknown values match nothing.
        let matches_role = match selected::<Role>(self.role.as_deref()) {
            None => true,
            Some(role) => role == Ok(profile.role),
        };
        let matches_status = match selected::<Status>(self.status.as_deref()) {
            None => true,
            Some(status) => status == Ok(profile.status),
        };

        matches_search && matches_role && matches_status
    }

    pub fn apply(&self, profiles: Vec<Profile>) -> Vec<Profile> {
        profiles.into_iter().filter(|p| self.matches(p)).collect()
    }
}
