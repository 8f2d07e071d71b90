use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Credential scheme applied to an outgoing HTTP request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
}

/// Request credentials. The secret fields are encrypted by the store before
/// they reach the database and stripped before a job is shown to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    #[serde(rename = "type", default)]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl Auth {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Basic,
            username: Some(username.into()),
            password: Some(password.into()),
            bearer_token: None,
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Bearer,
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.auth_type {
            AuthType::None => Ok(()),
            AuthType::Basic => {
                if is_blank(&self.username) {
                    return Err(ValidationError::EmptyUsername);
                }
                if is_blank(&self.password) {
                    return Err(ValidationError::EmptyPassword);
                }
                Ok(())
            }
            AuthType::Bearer => {
                if is_blank(&self.bearer_token) {
                    return Err(ValidationError::EmptyBearerToken);
                }
                Ok(())
            }
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// An HTTP call to perform when the job fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpJob {
    /// Target URL. `https://` is assumed when no scheme is given.
    pub url: String,
    /// HTTP verb, e.g. "GET" or "POST".
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Status codes that count as success. Empty means `200` only.
    #[serde(default)]
    pub valid_response_codes: Vec<u16>,
    #[serde(default)]
    pub auth: Auth,
}

impl HttpJob {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::EmptyHttpJobUrl);
        }
        if self.method.is_empty() {
            return Err(ValidationError::EmptyHttpJobMethod);
        }
        self.auth.validate()
    }

    /// Drop every secret from the auth block, keeping only its type.
    pub fn remove_credentials(&mut self) {
        self.auth.username = None;
        self.auth.password = None;
        self.auth.bearer_token = None;
    }

    /// Whether `status` counts as a successful response for this job.
    pub fn accepts_status(&self, status: u16) -> bool {
        if self.valid_response_codes.is_empty() {
            return status == 200;
        }
        self.valid_response_codes.contains(&status)
    }
}
