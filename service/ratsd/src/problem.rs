//! RFC 7807 problem responses

use std::fmt;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

pub const PROBLEM_MEDIA_TYPE: &str = "application/problem+json";

pub const INVALID_REQUEST_TYPE: &str = "tag:github.com,2024:veraison/ratsd:error:invalidrequest";
pub const UNAUTHORIZED_TYPE: &str = "tag:github.com,2024:veraison/ratsd:error:unauthorized";
const BLANK_TYPE: &str = "about:blank";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub detail: String,
    pub status: u16,
}

impl Problem {
    /// A problem typed only by its HTTP status
    pub fn detailed(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            kind: BLANK_TYPE.to_string(),
            title: status.canonical_reason().unwrap_or_default().to_string(),
            detail: detail.into(),
            status: status.as_u16(),
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            kind: INVALID_REQUEST_TYPE.to_string(),
            title: "invalid request".to_string(),
            detail: detail.into(),
            status: StatusCode::BAD_REQUEST.as_u16(),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            kind: UNAUTHORIZED_TYPE.to_string(),
            title: "access unauthorized".to_string(),
            detail: detail.into(),
            status: StatusCode::UNAUTHORIZED.as_u16(),
        }
    }

    pub fn not_acceptable(detail: impl Into<String>) -> Self {
        Self::detailed(StatusCode::NOT_ACCEPTABLE, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::detailed(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.title, self.status, self.detail)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        tracing::error!(status = self.status, kind = %self.kind, "{}", self.detail);

        let body = match serde_json::to_string(&self) {
            Ok(body) => body,
            Err(_) => self.detail.clone(),
        };
        (
            self.status_code(),
            [(header::CONTENT_TYPE, PROBLEM_MEDIA_TYPE)],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_only_problems_use_reason_phrase() {
        let p = Problem::internal("no sub-attester available");
        assert_eq!(p.kind, "about:blank");
        assert_eq!(p.title, "Internal Server Error");
        assert_eq!(p.status, 500);

        assert_eq!(Problem::not_acceptable("x").title, "Not Acceptable");
    }

    #[test]
    fn serializes_type_member() {
        let p = Problem::invalid_request("bad nonce");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": INVALID_REQUEST_TYPE,
                "title": "invalid request",
                "detail": "bad nonce",
                "status": 400,
            })
        );
    }

    #[test]
    fn response_carries_problem_media_type() {
        let response = Problem::unauthorized("no such user: eve").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROBLEM_MEDIA_TYPE
        );
    }
}
