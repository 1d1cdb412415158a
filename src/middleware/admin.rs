use crate::error::GatewayError;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Bearer check for operator endpoints. Without a configured token the
/// endpoints stay open.
#[derive(Clone, Debug)]
pub struct AdminGuard {
    token: Option<String>,
}

impl AdminGuard {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn authorize(&self, header: Option<&str>) -> Result<(), GatewayError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };

        let presented = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(GatewayError::Unauthorized)?;

        if presented.len() == expected.len()
            && presented
                .bytes()
                .zip(expected.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
        {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

pub async fn admin_guard_layer(
    State(guard): State<Arc<AdminGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    guard.authorize(header)?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_must_match_when_configured() {
        let guard = AdminGuard::new(Some("s3cret".to_string()));
        assert!(guard.authorize(Some("Bearer s3cret")).is_ok());
        assert!(matches!(guard.authorize(Some("Bearer nope")), Err(GatewayError::Unauthorized)));
        assert!(matches!(guard.authorize(Some("s3cret")), Err(GatewayError::Unauthorized)));
        assert!(matches!(guard.authorize(None), Err(GatewayError::Unauthorized)));
    }

    #[test]
    fn open_without_token() {
        assert!(AdminGuard::new(None).authorize(None).is_ok());
    }
}
