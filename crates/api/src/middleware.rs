use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use routeforge_auth::SessionResolver;

use crate::app::errors::json_error;

#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<dyn SessionResolver>,
}

/// Resolves a bearer token when one is present and inserts the `Principal`
/// into request extensions.
///
/// Anonymous requests pass through; endpoints that need a caller declare
/// `RequireAuth`. A token that does not resolve is rejected here with 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer(req.headers()) {
        Ok(Some(token)) => token.to_string(),
        Ok(None) => return next.run(req).await,
        Err(status) => return json_error(status, "malformed authorization header", None),
    };

    match state.resolver.resolve(&token).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "bearer token rejected");
            json_error(StatusCode::UNAUTHORIZED, format!("unauthorized: {err}"), None)
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, StatusCode> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), Ok(None));

        headers.insert("authorization", HeaderValue::from_static("Bearer  abc "));
        assert_eq!(extract_bearer(&headers), Ok(Some("abc")));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), Err(StatusCode::UNAUTHORIZED));
    }
}
