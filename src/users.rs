//! # Users and Subscribers
//!
//! Account registration and the offers mailing list.
//!
//! ## Registration
//! - name trimmed, email trimmed and lowercased, password as sent
//! - any of the three missing or blank: 422
//! - email already registered: 409
//! - password shorter than 6 characters: 400
//! - password stored as a bcrypt hash (cost 10), avatar defaults to `/default-avatar.svg`
//!
//! ## Subscribers
//! - email must look like `local@domain.tld`, no whitespace, otherwise 400
//! - subscribing again refreshes `createdAt`
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const BCRYPT_COST: u32 = 10;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const DEFAULT_AVATAR: &str = "/default-avatar.svg";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub image: String,
    pub address: String,
    pub favorites: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Registration with the required fields present and normalized.
#[derive(Debug)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn normalize(self) -> Result<ValidRegistration, AppError> {
        let name = self.name.map(|name| name.trim().to_string()).unwrap_or_default();
        let email = self
            .email
            .map(|email| email.trim().to_lowercase())
            .unwrap_or_default();
        let password = self.password.unwrap_or_default();

        let missing: Vec<&str> = [("name", &name), ("email", &email), ("password", &password)]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| field)
            .collect();

        if !missing.is_empty() {
            return Err(AppError::MissingFields(missing.join(", ")));
        }

        Ok(ValidRegistration {
            name,
            email,
            password,
        })
    }
}

impl ValidRegistration {
    pub fn check_password(&self) -> Result<(), AppError> {
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Invalid("password".into()));
        }

        Ok(())
    }

    /// Hashes the password; blocking, run it off the async workers.
    pub fn into_user(self) -> Result<User, AppError> {
        let password_hash = bcrypt::hash(&self.password, BCRYPT_COST)?;

        Ok(User {
            name: self.name,
            email: self.email,
            password_hash,
            role: Role::User,
            image: DEFAULT_AVATAR.to_string(),
            address: String::new(),
            favorites: Vec::new(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub email: Option<String>,
}

impl Subscription {
    pub fn into_subscriber(self) -> Result<Subscriber, AppError> {
        match self.email {
            Some(email) if EMAIL.is_match(&email) => Ok(Subscriber {
                email,
                created_at: Utc::now(),
            }),
            _ => Err(AppError::Invalid("email".into())),
        }
    }
}
