//! Caller extraction.
//!
//! Authentication is terminated upstream (gateway or auth proxy), which
//! forwards the verified identity in headers:
//! - `x-tenant-id` (required, UUID)
//! - `x-user-id`   (optional, UUID)
//! - `x-role`      (optional, defaults to `VIEWER`)

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use engine::{Caller, Role};
use uuid::Uuid;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-role";

/// The [`Caller`] a request acts for.
#[derive(Debug, Clone)]
pub struct RequestCaller(pub Caller);

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Result<Option<&'h str>, ApiError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::BadRequest(format!("header {name} is not valid text")))
        })
        .transpose()
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, ApiError> {
    header(headers, name)?
        .map(|v| {
            Uuid::parse_str(v.trim())
                .map_err(|_| ApiError::BadRequest(format!("header {name} must be a UUID")))
        })
        .transpose()
}

pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let tenant_id = uuid_header(headers, TENANT_HEADER)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {TENANT_HEADER} header")))?;
    let user_id = uuid_header(headers, USER_HEADER)?;
    let role = match header(headers, ROLE_HEADER)? {
        Some(raw) => raw.trim().parse::<Role>().map_err(ApiError::BadRequest)?,
        None => Role::Viewer,
    };
    Ok(Caller::new(tenant_id, user_id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn full_identity_is_parsed() {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        let caller = caller_from_headers(&headers(&[
            (TENANT_HEADER, &tenant.to_string()),
            (USER_HEADER, &user.to_string()),
            (ROLE_HEADER, "ml_engineer"),
        ]))
        .unwrap();

        assert_eq!(caller, Caller::new(tenant, Some(user), Role::MlEngineer));
    }

    #[test]
    fn role_defaults_to_viewer() {
        let tenant = Uuid::new_v4();
        let caller = caller_from_headers(&headers(&[(TENANT_HEADER, &tenant.to_string())])).unwrap();
        assert_eq!(caller.role, Role::Viewer);
        assert!(caller.user_id.is_none());
    }

    #[test]
    fn missing_or_malformed_tenant_is_rejected() {
        assert!(matches!(
            caller_from_headers(&HeaderMap::new()),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            caller_from_headers(&headers(&[(TENANT_HEADER, "acme")])),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let tenant = Uuid::new_v4().to_string();
        assert!(caller_from_headers(&headers(&[(TENANT_HEADER, &tenant), (ROLE_HEADER, "root")])).is_err());
    }
}
