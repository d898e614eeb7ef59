//! Newsletter signup validation.

use serde::{Deserialize, Serialize};

use crate::types::{Email, EmailError, SignupSource};

/// Longest accepted subscriber name.
pub const MAX_NAME_CHARS: usize = 120;

/// Raw signup form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub email: String,
    pub name: Option<String>,
    pub source: Option<SignupSource>,
}

/// Why a signup was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NewsletterError {
    #[error("please enter a valid email address")]
    InvalidEmail(#[from] EmailError),
    #[error("name must be at most {max} characters")]
    NameTooLong { max: usize },
}

/// A validated signup. The email is lowercased so it can be the upsert key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub email: Email,
    pub name: Option<String>,
    pub source: SignupSource,
}

impl SignupForm {
    /// Validate and normalize the form.
    ///
    /// # Errors
    ///
    /// Returns an error if the email is malformed or the name is too long.
    pub fn validate(self) -> Result<Signup, NewsletterError> {
        let email = Email::parse_normalized(&self.email)?;
        let name = self
            .name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty());
        if name
            .as_deref()
            .is_some_and(|n| n.chars().count() > MAX_NAME_CHARS)
        {
            return Err(NewsletterError::NameTooLong {
                max: MAX_NAME_CHARS,
            });
        }
        Ok(Signup {
            email,
            name,
            source: self.source.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form(email: &str) -> SignupForm {
        SignupForm {
            email: email.to_string(),
            ..SignupForm::default()
        }
    }

    #[test]
    fn test_email_is_lowercased() {
        let signup = form("TEST@EXAMPLE.COM").validate().unwrap();
        assert_eq!(signup.email.as_str(), "test@example.com");
        assert_eq!(signup.source, SignupSource::Footer);
    }

    #[test]
    fn test_rejects_invalid_email() {
        assert!(matches!(
            form("not-an-email").validate(),
            Err(NewsletterError::InvalidEmail(_))
        ));
        assert!(form("").validate().is_err());
    }

    #[test]
    fn test_blank_name_becomes_none() {
        let signup = SignupForm {
            name: Some("   ".to_string()),
            ..form("a@b.co")
        }
        .validate()
        .unwrap();
        assert_eq!(signup.name, None);
    }

    #[test]
    fn test_rejects_long_name() {
        let result = SignupForm {
            name: Some("x".repeat(MAX_NAME_CHARS + 1)),
            ..form("a@b.co")
        }
        .validate();
        assert_eq!(
            result,
            Err(NewsletterError::NameTooLong {
                max: MAX_NAME_CHARS
            })
        );
    }

    #[test]
    fn test_source_from_json() {
        let f: SignupForm =
            serde_json::from_str(r#"{"email":"a@b.co","source":"book_page"}"#).unwrap();
        assert_eq!(f.validate().unwrap().source, SignupSource::BookPage);
    }
}
