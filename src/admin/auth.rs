use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Admin API credentials. `None` leaves the API open.
#[derive(Clone, Default)]
pub struct AdminAuth {
    api_key: Option<Arc<str>>,
}

impl AdminAuth {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            api_key: api_key.map(Arc::from),
        }
    }

    fn allows(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return true;
        };
        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim() == expected)
            .unwrap_or(false)
    }
}

pub async fn admin_auth_middleware(
    State(auth): State<AdminAuth>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if auth.allows(authorization) {
        Ok(next.run(request).await)
    } else {
        tracing::debug!(path = %request.uri().path(), "Rejected admin request");
        Err(StatusCode::UNAUTHORIZED)
    }
}
