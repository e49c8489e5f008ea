use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::provider::ProviderError;

/// Everything a flow or the registry surface can report to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Missing/invalid bearer token on a registry endpoint.
    Unauthorized,
    /// Malformed request body.
    InvalidPayload,
    /// Password or OTP code incorrect.
    CredentialRejected,
    /// Account exists but the email was never confirmed.
    EmailUnverified,
    /// Explicit or silent duplicate on sign-up.
    DuplicateAccount,
    /// Provider throttled the request.
    RateLimited,
    /// No account for this email (OTP dispatch with create_if_absent=false).
    AccountNotFound,
    /// Logout's device-delete call failed; local credential must be kept.
    DeviceUnregisterFailed,
    /// Catch-all network/parse failure.
    Unexpected,
}

// The provider has no structured error-code contract, so we pattern-match its
// human-readable messages. Heuristic by nature; keep every pattern in this one
// table so hardening to a real error-code field stays a local change.
// Order matters: first matching row wins.
static PATTERNS: &[(&str, AuthErrorKind)] = &[
    (r"(?i)email (link|address)? ?not confirmed", AuthErrorKind::EmailUnverified),
    (r"(?i)confirm your email", AuthErrorKind::EmailUnverified),
    (r"(?i)already (been )?registered", AuthErrorKind::DuplicateAccount),
    (r"(?i)user already exists", AuthErrorKind::DuplicateAccount),
    (r"(?i)rate limit", AuthErrorKind::RateLimited),
    (r"(?i)too many requests", AuthErrorKind::RateLimited),
    (r"(?i)security purposes.*request this after", AuthErrorKind::RateLimited),
    (r"(?i)signups not allowed", AuthErrorKind::AccountNotFound),
    (r"(?i)user not found", AuthErrorKind::AccountNotFound),
    (r"(?i)invalid login credentials", AuthErrorKind::CredentialRejected),
    (r"(?i)(otp|token|code).*(invalid|expired)", AuthErrorKind::CredentialRejected),
    (r"(?i)(invalid|expired).*(otp|token|code)", AuthErrorKind::CredentialRejected),
];

static PATTERN_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(PATTERNS.iter().map(|(p, _)| *p)).unwrap());

pub fn classify(err: &ProviderError) -> AuthErrorKind {
    if let Some(idx) = PATTERN_SET.matches(&err.message).iter().next() {
        return PATTERNS[idx].1;
    }

    // HTTP status is a weaker signal than the message text but better than
    // nothing when the body didn't parse.
    match err.status {
        Some(401) | Some(403) => AuthErrorKind::CredentialRejected,
        Some(404) => AuthErrorKind::AccountNotFound,
        Some(429) => AuthErrorKind::RateLimited,
        _ => AuthErrorKind::Unexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(msg: &str) -> AuthErrorKind {
        classify(&ProviderError::new(msg))
    }

    #[test]
    fn classifies_bad_password() {
        assert_eq!(kind("Invalid login credentials"), AuthErrorKind::CredentialRejected);
    }

    #[test]
    fn classifies_bad_otp_code() {
        assert_eq!(
            kind("Token has expired or is invalid"),
            AuthErrorKind::CredentialRejected
        );
        assert_eq!(kind("Invalid OTP code entered"), AuthErrorKind::CredentialRejected);
    }

    #[test]
    fn classifies_unverified_email() {
        assert_eq!(kind("Email not confirmed"), AuthErrorKind::EmailUnverified);
    }

    #[test]
    fn classifies_duplicate() {
        assert_eq!(kind("User already registered"), AuthErrorKind::DuplicateAccount);
    }

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(
            kind("For security purposes, you can only request this after 57 seconds."),
            AuthErrorKind::RateLimited
        );
        assert_eq!(kind("Email rate limit exceeded"), AuthErrorKind::RateLimited);
    }

    #[test]
    fn classifies_unknown_email_on_preflight() {
        assert_eq!(kind("Signups not allowed for otp"), AuthErrorKind::AccountNotFound);
    }

    #[test]
    fn falls_back_to_status_then_unexpected() {
        let err = ProviderError {
            status: Some(429),
            message: "<html>slow down</html>".into(),
        };
        assert_eq!(classify(&err), AuthErrorKind::RateLimited);
        assert_eq!(kind("connection reset by peer"), AuthErrorKind::Unexpected);
    }
}
