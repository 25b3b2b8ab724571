use super::*;

#[test]
fn only_silent_unauthorized_is_silent() {
    let silent = ApiError::Unauthorized { path: "/api/reviews".into(), silent: true };
    let loud = ApiError::Unauthorized { path: "/api/orders".into(), silent: false };
    assert!(silent.is_silent());
    assert!(!loud.is_silent());
    assert!(!ApiError::RateLimited { path: "/api/orders".into() }.is_silent());
    assert!(!ApiError::Validation("Invalid credentials".into()).is_silent());
}

#[test]
fn error_codes_distinguish_auth_and_rate_limit() {
    assert_eq!(ApiError::Unauthorized { path: "/x".into(), silent: false }.error_code(), "E_UNAUTHORIZED");
    assert_eq!(ApiError::RateLimited { path: "/x".into() }.error_code(), "E_RATE_LIMITED");
    assert_eq!(ApiError::Transport(TransportError("reset".into())).error_code(), "E_TRANSPORT");
    assert_eq!(ApiError::Validation("bad".into()).error_code(), "E_VALIDATION");
}

#[test]
fn validation_displays_backend_message_verbatim() {
    let err = ApiError::Validation("Invalid credentials".into());
    assert_eq!(err.to_string(), "Invalid credentials");
}

#[test]
fn transport_error_converts_into_api_error() {
    let err: ApiError = TransportError("connection refused".into()).into();
    assert_eq!(err.to_string(), "transport failed: connection refused");
}

#[test]
fn rate_limited_refresh_never_ends_session() {
    assert!(!RefreshError::RateLimited.ends_session());
    assert!(RefreshError::Expired.ends_session());
    assert!(RefreshError::Transport("dns".into()).ends_session());
    assert!(RefreshError::Server(502).ends_session());
}
