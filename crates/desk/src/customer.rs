//! Customer records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Standing of a customer account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    Closed,
}

/// A customer as stored by the desk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub account_status: AccountStatus,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl Customer {
    /// Create an active customer with no recorded interaction.
    ///
    /// Fails if `email` has no `@`.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self> {
        let email = email.into();
        validate_email(&email)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            email,
            phone: None,
            account_status: AccountStatus::Active,
            last_interaction: None,
        })
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.account_status = status;
        self
    }

    pub fn with_last_interaction(mut self, at: DateTime<Utc>) -> Self {
        self.last_interaction = Some(at);
        self
    }

    /// Re-check field rules, e.g. after deserializing untrusted input.
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)
    }
}

fn validate_email(email: &str) -> Result<()> {
    if email.contains('@') {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Invalid email format: {email} must contain @"
        )))
    }
}
