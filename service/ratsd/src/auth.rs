//! Request authorization
//!
//! Three backends, chosen by `auth.type`: `none` and `passthrough` admit
//! every request, `basic` checks HTTP Basic credentials against the
//! configured users.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bcrypt::HashParts;

use crate::config::AuthConfig;
use crate::http::SharedState;
use crate::problem::Problem;

pub const BASIC_REALM: &str = "Basic realm=veraison";

pub trait Authorizer: Send + Sync {
    fn authorize(&self, headers: &HeaderMap, path: &str) -> Result<(), Problem>;
}

/// Admits everything without a trace
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _headers: &HeaderMap, _path: &str) -> Result<(), Problem> {
        Ok(())
    }
}

/// Admits everything, logging the path
pub struct Passthrough;

impl Authorizer for Passthrough {
    fn authorize(&self, _headers: &HeaderMap, path: &str) -> Result<(), Problem> {
        tracing::debug!(path, "passthrough");
        Ok(())
    }
}

pub struct BasicAuthorizer {
    /// user → bcrypt hash of the password
    users: HashMap<String, String>,
}

impl BasicAuthorizer {
    pub fn new<I, K, V>(users: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut table = HashMap::new();
        for (name, hash) in users {
            let name = name.into();
            let hash = hash.as_ref();
            hash.parse::<HashParts>()
                .with_context(|| format!("invalid user {name:?}: password is not a bcrypt hash"))?;

            tracing::debug!(user = %name, "registered user");
            table.insert(name, hash.to_string());
        }
        Ok(Self { users: table })
    }
}

impl Authorizer for BasicAuthorizer {
    fn authorize(&self, headers: &HeaderMap, path: &str) -> Result<(), Problem> {
        tracing::debug!(path, "auth basic");

        let Some((user, password)) = basic_credentials(headers) else {
            return Err(Problem::unauthorized("no Basic Authorization given"));
        };

        let Some(expected) = self.users.get(&user) else {
            return Err(Problem::unauthorized(format!("no such user: {user}")));
        };

        match bcrypt::verify(&password, expected) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%user, "password check failed");
                return Err(Problem::unauthorized("wrong username or password"));
            }
            Err(e) => {
                tracing::warn!(%user, error = %e, "password check errored");
                return Err(Problem::unauthorized("wrong username or password"));
            }
        }

        tracing::debug!(%user, "user authenticated");
        Ok(())
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

pub fn build_authorizer(config: &AuthConfig) -> Result<Arc<dyn Authorizer>> {
    Ok(match config {
        AuthConfig::None => Arc::new(AllowAll),
        AuthConfig::Passthrough => Arc::new(Passthrough),
        AuthConfig::Basic { users } => Arc::new(BasicAuthorizer::new(
            users.iter().map(|(name, user)| (name.clone(), user.password.as_str())),
        )?),
    })
}

/// axum middleware running the configured [`Authorizer`]
pub async fn require_auth(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    match state
        .authorizer
        .authorize(request.headers(), request.uri().path())
    {
        Ok(()) => next.run(request).await,
        Err(problem) => {
            let mut response = problem.into_response();
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_REALM));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_header(user: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{user}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    fn hash(password: &str) -> String {
        bcrypt::hash(password, 4).unwrap()
    }

    fn authorizer() -> BasicAuthorizer {
        BasicAuthorizer::new([("alice", hash("s3cret"))]).unwrap()
    }

    #[test]
    fn accepts_valid_credentials() {
        assert!(authorizer()
            .authorize(&basic_header("alice", "s3cret"), "/ratsd/chares")
            .is_ok());
    }

    #[test]
    fn rejects_missing_unknown_and_wrong_credentials() {
        let auth = authorizer();

        let err = auth.authorize(&HeaderMap::new(), "/").unwrap_err();
        assert_eq!(err.detail, "no Basic Authorization given");
        assert_eq!(err.status, 401);

        let err = auth.authorize(&basic_header("bob", "s3cret"), "/").unwrap_err();
        assert_eq!(err.detail, "no such user: bob");

        let err = auth.authorize(&basic_header("alice", "guess"), "/").unwrap_err();
        assert_eq!(err.detail, "wrong username or password");
    }

    #[test]
    fn password_may_contain_colons() {
        let auth = BasicAuthorizer::new([("carol", hash("a:b:c"))]).unwrap();
        assert!(auth.authorize(&basic_header("carol", "a:b:c"), "/").is_ok());
    }

    #[test]
    fn accepts_hashes_from_other_bcrypt_implementations() {
        // Go's x/crypto/bcrypt writes the $2a$ prefix
        let legacy = hash("password").replacen("$2b$", "$2a$", 1);
        assert!(legacy.starts_with("$2a$"));
        let auth = BasicAuthorizer::new([("erin", legacy)]).unwrap();
        assert!(auth.authorize(&basic_header("erin", "password"), "/").is_ok());
        assert!(auth.authorize(&basic_header("erin", "Password"), "/").is_err());
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!(BasicAuthorizer::new([("dave", "xyz")]).is_err());
        // an unsalted SHA-256 digest is not accepted as a password hash
        assert!(BasicAuthorizer::new([(
            "dave",
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        )])
        .is_err());
    }
}
