//! Demo authentication and session state

use audit_trail::{AuditLog, ErrorHandler, IdentityProvider};
use chrono::Utc;
use portfolio_monitor_core::{AppError, AppResult, UserId};
use portfolio_monitor_database::{
    LocalStorage, IS_AUTHENTICATED_KEY, SESSION_ID_KEY, USER_KEY,
};
use secrecy::{ExposeSecret, Secret};
use security_guard::{generate_secure_token, InputKind, SecurityGuard};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

pub const DEMO_EMAIL: &str = "admin@abc.com";
pub const DEMO_PASSWORD: &str = "password123";
/// Login attempts allowed per email per rate-limit window
const LOGIN_ATTEMPT_LIMIT: usize = 5;

/// Signed-in user as kept in local storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
}

impl SessionUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// Reads the signed-in user and session id back out of storage
#[derive(Clone)]
pub struct StorageIdentity {
    local: Arc<LocalStorage>,
    session: Arc<LocalStorage>,
}

impl StorageIdentity {
    pub fn new(local: Arc<LocalStorage>, session: Arc<LocalStorage>) -> Self {
        Self { local, session }
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        if self.local.get::<bool>(IS_AUTHENTICATED_KEY) != Some(true) {
            return None;
        }
        self.local.get(USER_KEY)
    }
}

impl IdentityProvider for StorageIdentity {
    fn user_id(&self) -> Option<String> {
        self.current_user().map(|user| user.id.to_string())
    }

    fn session_id(&self) -> Option<String> {
        self.session.get(SESSION_ID_KEY)
    }
}

pub struct AuthService {
    identity: StorageIdentity,
    local: Arc<LocalStorage>,
    session: Arc<LocalStorage>,
    audit: Arc<AuditLog>,
    errors: Arc<ErrorHandler>,
    security: Arc<SecurityGuard>,
}

impl AuthService {
    pub fn new(
        identity: StorageIdentity,
        audit: Arc<AuditLog>,
        errors: Arc<ErrorHandler>,
        security: Arc<SecurityGuard>,
    ) -> Self {
        Self {
            local: identity.local.clone(),
            session: identity.session.clone(),
            identity,
            audit,
            errors,
            security,
        }
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub fn login(&self, credentials: &Credentials) -> AppResult<SessionUser> {
        match self.authenticate(credentials) {
            Ok(user) => {
                self.start_session(&user)?;
                self.audit.log_auth_event(
                    "LOGIN",
                    json!({ "email": user.email, "userId": user.id }),
                );
                info!("User {} signed in", user.email);
                Ok(user)
            }
            Err(err) => {
                self.audit.log_auth_event(
                    "FAILED",
                    json!({ "email": credentials.email, "reason": err.message() }),
                );
                self.errors.handle_error(&err, json!({ "context": "login" }));
                Err(err)
            }
        }
    }

    fn authenticate(&self, credentials: &Credentials) -> AppResult<SessionUser> {
        let password = credentials.password.expose_secret();
        if credentials.email.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation(
                "Please fill in all fields",
                Some("email"),
                None::<String>,
            ));
        }
        if !credentials.email.contains('@') {
            return Err(AppError::validation(
                "Please enter a valid email address",
                Some("email"),
                Some(credentials.email.as_str()),
            ));
        }

        let email = self.security.sanitize_input(&credentials.email, InputKind::Email)?;
        if !self
            .security
            .check_rate_limit(&format!("login:{}", email), Some(LOGIN_ATTEMPT_LIMIT))
        {
            return Err(AppError::authentication(
                "Too many login attempts. Please try again later.",
                Some("login"),
            ));
        }

        if email == DEMO_EMAIL && password == DEMO_PASSWORD {
            Ok(SessionUser {
                id: 1,
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email,
                role: "Portfolio Manager".to_string(),
            })
        } else {
            Err(AppError::authentication(
                format!("Invalid email or password. Use {} / {}", DEMO_EMAIL, DEMO_PASSWORD),
                Some("login"),
            ))
        }
    }

    fn start_session(&self, user: &SessionUser) -> AppResult<()> {
        self.local.set(USER_KEY, user)?;
        self.local.set(IS_AUTHENTICATED_KEY, &true)?;
        let session_id = format!("session_{}_{}", Utc::now().timestamp_millis(), generate_secure_token(9));
        self.session.set(SESSION_ID_KEY, &session_id)?;
        Ok(())
    }

    pub fn logout(&self) -> AppResult<()> {
        let user = self.identity.current_user();
        // logged before the session is torn down so the event carries the user
        self.audit.log_auth_event(
            "LOGOUT",
            user.as_ref()
                .map_or(Value::Null, |u| json!({ "email": u.email, "userId": u.id })),
        );
        self.local.remove(USER_KEY)?;
        self.local.remove(IS_AUTHENTICATED_KEY)?;
        self.session.remove(SESSION_ID_KEY)?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.identity.current_user()
    }

    /// The signed-in user, or an authentication error
    pub fn require_user(&self) -> AppResult<SessionUser> {
        self.current_user().ok_or_else(|| {
            AppError::authentication("Please sign in to continue", Some("require_user"))
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }
}
