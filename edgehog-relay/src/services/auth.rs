use reqwest::header::HeaderValue;

use crate::error::FetchError;

/// Supplies the bearer token attached to every request.
pub trait TokenProvider: Send + Sync + 'static {
    /// The current token, `None` when the session is anonymous.
    fn token(&self) -> Option<String>;
}

/// Provider for anonymous sessions: requests carry an empty bearer token.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

/// A token fixed for the lifetime of the transport.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

pub(crate) fn authorization(provider: &dyn TokenProvider) -> Result<HeaderValue, FetchError> {
    let token = provider.token().unwrap_or_default();
    let mut value = HeaderValue::try_from(format!("Bearer {token}")).map_err(|error| {
        FetchError::MalformedRequest {
            reason: format!("invalid bearer token: {error}"),
        }
    })?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header() {
        let value = authorization(&StaticToken::new("eyJhbGciOi")).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer eyJhbGciOi");
        assert!(value.is_sensitive());

        let value = authorization(&NoToken).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer ");
    }

    #[test]
    fn invalid_token_is_rejected() {
        let error = authorization(&StaticToken::new("line\nbreak")).unwrap_err();
        assert!(matches!(error, FetchError::MalformedRequest { .. }));
    }

    #[test]
    fn debug_hides_token() {
        assert_eq!(
            format!("{:?}", StaticToken::new("secret")),
            r#"StaticToken("<redacted>")"#
        );
    }
}
