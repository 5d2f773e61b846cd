//! Optional bearer-token guard for every gateway route.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Json,
};
use ring::{constant_time, digest};

use super::AppState;

/// Reject requests without the configured bearer token. No-op when no
/// token is configured.
pub(crate) async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: middleware::Next,
) -> Response {
    let Some(expected) = state.api_token.as_deref() else {
        return next.run(req).await;
    };

    let verdict = presented_token(&req).map(|token| tokens_match(token, expected));
    match verdict {
        Some(true) => next.run(req).await,
        Some(false) => {
            tracing::debug!(path = %req.uri().path(), "rejected request with wrong token");
            unauthorized("invalid token")
        }
        None => unauthorized("missing or invalid Authorization header"),
    }
}

/// Token from `Authorization: Bearer <t>`, else from `?token=<t>`.
fn presented_token(req: &Request<Body>) -> Option<&str> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| {
            let (scheme, token) = h.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });

    from_header.or_else(|| {
        req.uri()
            .query()?
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
    })
}

/// Compare tokens without leaking where they first differ. Both sides are
/// hashed first so the comparison length is fixed.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = digest::digest(&digest::SHA256, presented.as_bytes());
    let b = digest::digest(&digest::SHA256, expected.as_bytes());
    constant_time::verify_slices_are_equal(a.as_ref(), b.as_ref()).is_ok()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut b = Request::builder().uri(uri);
        if let Some(v) = authorization {
            b = b.header(header::AUTHORIZATION, v);
        }
        b.body(Body::empty()).unwrap()
    }

    #[test]
    fn tokens_match_only_when_equal() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }

    #[test]
    fn header_token_preferred_over_query() {
        let req = request("/api/sessions?token=q", Some("Bearer  h "));
        assert_eq!(presented_token(&req), Some("h"));
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let req = request("/chats", Some("bearer abc"));
        assert_eq!(presented_token(&req), Some("abc"));
        let basic = request("/chats", Some("Basic abc"));
        assert_eq!(presented_token(&basic), None);
    }

    #[test]
    fn query_token_used_without_header() {
        let req = request("/api/status?x=1&token=abc", None);
        assert_eq!(presented_token(&req), Some("abc"));
        assert_eq!(presented_token(&request("/api/status", None)), None);
    }
}
