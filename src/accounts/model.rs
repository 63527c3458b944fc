use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    #[default]
    Tourist,
    Provider,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum Gender {
    #[serde(rename = "M")]
    #[sqlx(rename = "M")]
    Male,
    #[serde(rename = "F")]
    #[sqlx(rename = "F")]
    Female,
    #[serde(rename = "O")]
    #[sqlx(rename = "O")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
    Fr,
    De,
}

/// Unrecognised value for one of the account enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not a valid choice.")]
pub struct InvalidChoice(pub String);

impl FromStr for Role {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tourist" => Ok(Role::Tourist),
            "provider" => Ok(Role::Provider),
            "admin" => Ok(Role::Admin),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

impl FromStr for Gender {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            "O" => Ok(Gender::Other),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

impl FromStr for Language {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Language::En),
            "ar" => Ok(Language::Ar),
            "fr" => Ok(Language::Fr),
            "de" => Ok(Language::De),
            other => Err(InvalidChoice(other.to_string())),
        }
    }
}

/// Account record in the `accounts` table.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string, never serialized
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_staff: bool,
    pub phone_number: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<Date>,
    pub nationality: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub profile_picture: Option<String>, // storage key
    pub bio: Option<String>,
    pub website: Option<String>,
    pub business_name: Option<String>,
    pub business_license: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub identity_verified: bool,
    pub license_verified: bool,
    pub language_preference: Language,
    pub receive_notifications: bool,
    pub receive_sms: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

impl Account {
    /// "First Last", or the username when both parts are blank.
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.is_staff
    }
}

/// Validated registration input handed to the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
}

/// Owner-editable columns touched by one profile update. `None` leaves the
/// stored value alone; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<Option<String>>,
    pub gender: Option<Option<Gender>>,
    pub date_of_birth: Option<Option<Date>>,
    pub nationality: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub country: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub website: Option<Option<String>>,
    pub business_name: Option<Option<String>>,
    pub business_license: Option<Option<String>>,
    pub language_preference: Option<Language>,
    pub receive_notifications: Option<bool>,
    pub receive_sms: Option<bool>,
}

fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

impl ProfileChanges {
    pub fn apply_to(&self, a: &mut Account) {
        set(&mut a.first_name, &self.first_name);
        set(&mut a.last_name, &self.last_name);
        set(&mut a.phone_number, &self.phone_number);
        set(&mut a.gender, &self.gender);
        set(&mut a.date_of_birth, &self.date_of_birth);
        set(&mut a.nationality, &self.nationality);
        set(&mut a.address, &self.address);
        set(&mut a.city, &self.city);
        set(&mut a.state, &self.state);
        set(&mut a.postal_code, &self.postal_code);
        set(&mut a.country, &self.country);
        set(&mut a.bio, &self.bio);
        set(&mut a.website, &self.website);
        set(&mut a.business_name, &self.business_name);
        set(&mut a.business_license, &self.business_license);
        set(&mut a.language_preference, &self.language_preference);
        set(&mut a.receive_notifications, &self.receive_notifications);
        set(&mut a.receive_sms, &self.receive_sms);
    }
}
