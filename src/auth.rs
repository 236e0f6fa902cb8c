use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

/// Roles carried in the JWT custom claims
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    Admin,
    Controlador,
    Cliente,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    pub exp: usize,
    pub iat: usize,
}

/// The verified identity of a request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
}

impl AuthenticatedUser {
    pub fn email_lower(&self) -> String {
        self.email.to_ascii_lowercase()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("malformed authorization header".into()))?;

        let claims = decode_token(token, &state.config.jwt_secret)?;
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            company_id: claims.company_id,
        })
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
}

/// Mints an HS256 token for the given identity
pub fn issue_token(
    user_id: &str,
    email: &str,
    role: UserRole,
    company_id: Option<Uuid>,
    secret: &str,
    expiration_secs: usize,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role,
        company_id,
        exp: now + expiration_secs,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("token encoding failed: {}", e)))
}

/// Authorization policy. Every role/owner decision in the application goes
/// through these functions; call sites never inspect emails or roles
/// themselves.
pub mod policy {
    use super::*;

    /// Owner identities are configured by email and bypass both the admin
    /// checks and the billing gate.
    pub fn is_owner(email: &str, owner_emails: &[String]) -> bool {
        let email = email.to_ascii_lowercase();
        owner_emails.iter().any(|o| *o == email)
    }

    /// Company management is owner-only
    pub fn require_owner(
        user: &AuthenticatedUser,
        owner_emails: &[String],
    ) -> Result<(), ServiceError> {
        if is_owner(&user.email_lower(), owner_emails) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "restricted to owner accounts".into(),
            ))
        }
    }

    /// Reading/updating a company: owners, or admins of that same company
    pub fn require_company_access(
        user: &AuthenticatedUser,
        owner_emails: &[String],
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        if is_owner(&user.email_lower(), owner_emails) {
            return Ok(());
        }
        if user.role == UserRole::Admin && user.company_id == Some(company_id) {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "not a member of this company".into(),
        ))
    }

    /// Field operations (orders, devices, pest counts): owners, or admin and
    /// controller roles scoped to their own company.
    pub fn require_staff(
        user: &AuthenticatedUser,
        owner_emails: &[String],
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        if is_owner(&user.email_lower(), owner_emails) {
            return Ok(());
        }
        if matches!(user.role, UserRole::Admin | UserRole::Controlador)
            && user.company_id == Some(company_id)
        {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "not authorized for this company's orders".into(),
        ))
    }

    /// Read-only access: any role that belongs to the company, or an owner
    pub fn require_member(
        user: &AuthenticatedUser,
        owner_emails: &[String],
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        if is_owner(&user.email_lower(), owner_emails) {
            return Ok(());
        }
        if user.company_id == Some(company_id) {
            return Ok(());
        }
        Err(ServiceError::Forbidden(
            "not a member of this company".into(),
        ))
    }

    /// The billing gate for report generation: clients always pass, owners
    /// bypass, everyone else needs an active subscription.
    pub fn allow_report_generation(
        user: &AuthenticatedUser,
        owner_emails: &[String],
        subscription_active: bool,
    ) -> Result<(), ServiceError> {
        if user.role == UserRole::Cliente {
            return Ok(());
        }
        if is_owner(&user.email_lower(), owner_emails) {
            return Ok(());
        }
        if subscription_active {
            return Ok(());
        }
        Err(ServiceError::SubscriptionInactive(
            "report generation is blocked for admin and controller roles".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, email: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "u1".into(),
            email: email.into(),
            role,
            company_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn token_round_trip() {
        let secret = "0123456789abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqr";
        let company = Uuid::new_v4();
        let token = issue_token("u1", "a@b.com", UserRole::Admin, Some(company), secret, 600)
            .unwrap();
        let claims = decode_token(&token, secret).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.company_id, Some(company));
    }

    #[test]
    fn tampered_token_rejected() {
        let secret = "0123456789abcdefghijklmnopqrstuvwxyz0123456789abcdefghijklmnopqr";
        let token = issue_token("u1", "a@b.com", UserRole::Cliente, None, secret, 600).unwrap();
        assert!(decode_token(&token, "another_secret_that_is_not_the_right_one").is_err());
    }

    #[test]
    fn clients_bypass_billing_gate() {
        let u = user(UserRole::Cliente, "c@x.com");
        assert!(policy::allow_report_generation(&u, &[], false).is_ok());
    }

    #[test]
    fn owners_bypass_billing_gate() {
        let u = user(UserRole::Admin, "Owner@X.com");
        let owners = vec!["owner@x.com".to_string()];
        assert!(policy::allow_report_generation(&u, &owners, false).is_ok());
    }

    #[test]
    fn inactive_subscription_blocks_admin() {
        let u = user(UserRole::Admin, "a@x.com");
        let err = policy::allow_report_generation(&u, &[], false).unwrap_err();
        assert!(matches!(err, ServiceError::SubscriptionInactive(_)));
        assert!(policy::allow_report_generation(&u, &[], true).is_ok());
    }

    #[test]
    fn company_access_scoped_to_own_company() {
        let mut u = user(UserRole::Admin, "a@x.com");
        let own = u.company_id.unwrap();
        assert!(policy::require_company_access(&u, &[], own).is_ok());
        assert!(policy::require_company_access(&u, &[], Uuid::new_v4()).is_err());
        u.role = UserRole::Controlador;
        assert!(policy::require_company_access(&u, &[], own).is_err());
    }
}
