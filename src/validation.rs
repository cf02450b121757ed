//! Request validation
//!
//! Each check is a plain function; handlers run them in a fixed order and
//! collect the failures into [`ValidationErrors`], which renders as the
//! `{"field": ["message", ...]}` body of a 400 response.

use std::collections::BTreeMap;

use serde::Serialize;
use validator::{ValidateEmail, ValidateLength};

use crate::model::MAX_TEAM_SIZE;

pub const REQUIRED: &str = "This field is required.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match.";
pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 150;

/// Passwords rejected outright regardless of length
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "11111111", "00000000", "abc12345",
    "abcd1234", "letmein1", "welcome1", "sunshine", "princess", "football",
    "baseball", "trustno1", "pokemon1", "pikachu1", "superman", "starwars",
];

/// Field-scoped validation messages
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-message error for one field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: Vec<String>) {
        for message in messages {
            self.add(field, message);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Password strength rules: minimum length, not common, not entirely
/// numeric, not too close to the username or e-mail.
pub fn validate_password(password: &str, username: &str, email: Option<&str>) -> Result<(), Vec<String>> {
    let mut messages = Vec::new();
    let lowered = password.to_lowercase();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        messages.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        messages.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        messages.push("This password is entirely numeric.".to_string());
    }

    let email_local = email.and_then(|email| email.split('@').next());
    for (attribute, value) in [("username", Some(username)), ("email address", email_local)] {
        if value.is_some_and(|value| too_similar(&lowered, value)) {
            messages.push(format!("The password is too similar to the {}.", attribute));
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

fn too_similar(password: &str, attribute: &str) -> bool {
    let attribute = attribute.trim().to_lowercase();
    attribute.chars().count() >= 3 && (password.contains(&attribute) || attribute.contains(password))
}

pub fn validate_username(username: &str) -> Result<(), Vec<String>> {
    if username.is_empty() {
        return Err(vec![REQUIRED.to_string()]);
    }
    let mut messages = Vec::new();
    if !username.validate_length(Some(1u64), Some(MAX_USERNAME_LENGTH as u64), None) {
        messages.push(format!(
            "Ensure this field has no more than {} characters.",
            MAX_USERNAME_LENGTH
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        messages.push(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

/// Syntax check via `validator`, tightened to dot-atom local parts and
/// dotted domains (`a..b@c.de` and `ash@example` are rejected).
pub fn validate_email(email: &str) -> Result<(), Vec<String>> {
    let valid = email.validate_email()
        && match email.rsplit_once('@') {
            Some((local, domain)) => {
                local.split('.').all(|atom| !atom.is_empty()) && domain.contains('.')
            }
            None => false,
        };
    if valid {
        Ok(())
    } else {
        Err(vec!["Enter a valid email address.".to_string()])
    }
}

/// Trims an optional e-mail; blank becomes `None`.
pub fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
}

fn positive_id(raw: i64) -> Option<u32> {
    u32::try_from(raw).ok().filter(|id| *id > 0)
}

/// `pokemon_id` of an add-favorite request.
pub fn validate_pokemon_id(raw: Option<i64>) -> Result<u32, ValidationErrors> {
    let raw = raw.ok_or_else(|| ValidationErrors::field("pokemon_id", REQUIRED))?;
    positive_id(raw).ok_or_else(|| {
        ValidationErrors::field("pokemon_id", "Ensure this value is greater than or equal to 1.")
    })
}

/// `pokemon_ids` of a set-team request: 0..=6 unique positive ids.
pub fn validate_team(raw: Option<Vec<i64>>) -> Result<Vec<u32>, ValidationErrors> {
    let raw = raw.ok_or_else(|| ValidationErrors::field("pokemon_ids", REQUIRED))?;

    let ids = raw
        .iter()
        .map(|&id| positive_id(id))
        .collect::<Option<Vec<u32>>>()
        .ok_or_else(|| {
            ValidationErrors::field("pokemon_ids", "Ensure every id is greater than or equal to 1.")
        })?;

    let mut unique = ids.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != ids.len() {
        return Err(ValidationErrors::field(
            "pokemon_ids",
            "Duplicate Pokémon are not allowed in the team.",
        ));
    }
    if ids.len() > MAX_TEAM_SIZE {
        return Err(ValidationErrors::field(
            "pokemon_ids",
            format!("Team is full (max. {}).", MAX_TEAM_SIZE),
        ));
    }
    Ok(ids)
}
