use actix_web::{HttpRequest, http::header::AUTHORIZATION};

/// Cookie Clerk sets for same-origin requests.
pub const SESSION_COOKIE: &str = "__session";

/// Session token presented by the caller, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    token: Option<String>,
}

impl SessionCredentials {
    pub fn anonymous() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Bearer token first, then the session cookie.
    pub fn from_request(req: &HttpRequest) -> Self {
        let bearer = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value
                    .strip_prefix("Bearer ")
                    .or_else(|| value.strip_prefix("bearer "))
            })
            .map(str::trim)
            .filter(|token| !token.is_empty());

        if let Some(token) = bearer {
            return Self::with_token(token);
        }

        let token = req
            .cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty());
        Self { token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
