//! Security gate applied per route group
//!
//! Every request passes, in order: identity resolution, role check, CSRF
//! check and rate limiting. Input validation runs afterwards, in the
//! handler's `ValidatedJson` / `ValidatedQuery` extractor.

use axum::{
    Router, async_trait,
    extract::{FromRequestParts, MatchedPath, Request, State},
    http::request::Parts,
    middleware::{self, Next},
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::{
    auth::{Role, TokenType},
    http::{ApiError, CSRF_HEADER, client_ip},
    rate_limit::RateDecision,
    session::SessionRecord,
    settings::RateLimitRule,
    token::constant_time_eq,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::AppState;

/// What a route group demands before its handlers run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    pub require_auth: bool,
    pub require_admin: bool,
    pub require_csrf: bool,
    pub rate_limit: Option<RateLimitRule>,
}

impl Policy {
    /// Anyone; a valid token is still resolved when present
    pub const PUBLIC: Policy = Policy {
        require_auth: false,
        require_admin: false,
        require_csrf: false,
        rate_limit: None,
    };

    pub const AUTHENTICATED: Policy = Policy {
        require_auth: true,
        ..Policy::PUBLIC
    };

    pub const ADMIN: Policy = Policy {
        require_auth: true,
        require_admin: true,
        ..Policy::PUBLIC
    };

    pub const fn with_csrf(self) -> Self {
        Self {
            require_csrf: true,
            ..self
        }
    }

    pub const fn rate_limited(self, rule: RateLimitRule) -> Self {
        Self {
            rate_limit: Some(rule),
            ..self
        }
    }
}

/// The signed-in caller, available to handlers behind the gate
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub session_id: Uuid,
    pub ip_address: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Clone)]
struct Gate {
    state: AppState,
    policy: Policy,
}

/// Put every route of `router` behind `policy`
pub fn protect(router: Router<AppState>, state: &AppState, policy: Policy) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        Gate {
            state: state.clone(),
            policy,
        },
        security_gate,
    ))
}

async fn security_gate(
    State(gate): State<Gate>,
    matched_path: Option<MatchedPath>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let policy = gate.policy;
    let ip_address = client_ip(request.headers());

    let session = match bearer {
        Some(TypedHeader(Authorization(bearer))) => {
            resolve_session(&gate.state, bearer.token()).await?
        }
        None => None,
    };

    if (policy.require_auth || policy.require_admin) && session.is_none() {
        return Err(ApiError::Unauthenticated);
    }

    if policy.require_admin && !session.as_ref().is_some_and(|s| s.role.is_admin()) {
        return Err(ApiError::forbidden("Administrator access required"));
    }

    if policy.require_csrf {
        let provided = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok());
        let valid = match (&session, provided) {
            (Some(session), Some(token)) => {
                !session.csrf_token.is_empty() && constant_time_eq(&session.csrf_token, token)
            }
            _ => false,
        };
        if !valid {
            return Err(ApiError::InvalidCsrf);
        }
    }

    if let Some(rule) = policy.rate_limit {
        let caller = match &session {
            Some(session) => format!("user:{}", session.user_id),
            None => format!("ip:{}", ip_address.as_deref().unwrap_or("unknown")),
        };
        let route = matched_path
            .as_ref()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        let key = format!("{}:{} {}", caller, request.method(), route);

        let decision = gate.state.rate_limiter.check(&key, rule).await;
        if let RateDecision::Limited { .. } = decision {
            warn!("Rate limit exceeded for {}", key);
            return Err(ApiError::RateLimited {
                retry_after: decision.retry_after_secs(),
            });
        }
    }

    if let Some(session) = session {
        request.extensions_mut().insert(Identity {
            user_id: session.user_id,
            role: session.role,
            session_id: session.id,
            ip_address,
        });
    }

    Ok(next.run(request).await)
}

/// Live session behind an access token; `None` for any invalid token
async fn resolve_session(state: &AppState, token: &str) -> Result<Option<SessionRecord>, ApiError> {
    let claims = match state.verifier.verify(token, TokenType::Access) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Rejected access token: {}", e);
            return Ok(None);
        }
    };

    let session = state
        .sessions
        .get_session(claims.sid)
        .await?
        .filter(|session| session.user_id == claims.sub);

    if session.is_none() {
        debug!("Session {} for user {} is no longer active", claims.sid, claims.sub);
    }
    Ok(session)
}
