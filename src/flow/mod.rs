pub mod login;
pub mod reset;
pub mod signup;

use std::time::Duration;

use crate::provider::classify::AuthErrorKind;

/// Which network action a flow currently has in flight. At most one per flow
/// instance; submits while busy are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyAction {
    PasswordSignIn,
    SignUp,
    OtpDispatch,
    OtpVerify,
    PasswordUpdate,
    SignOut,
}

/// What the UI shows for a failed action: a message pinned to one input
/// field, or a toast-style notice. Never both for the same error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowFeedback {
    FieldError {
        field: &'static str,
        message: String,
    },
    Notice {
        message: String,
    },
}

impl FlowFeedback {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        FlowFeedback::FieldError {
            field,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        FlowFeedback::Notice {
            message: message.into(),
        }
    }
}

/// Tuning constants, not invariants. The loader delay only smooths the UI
/// between OTP dispatch and code entry.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub loader_delay: Duration,
    pub min_password_len: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            loader_delay: Duration::from_millis(800),
            min_password_len: 8,
        }
    }
}

/// Generic notices for the classes that read the same on every screen.
pub fn generic_notice(kind: AuthErrorKind) -> FlowFeedback {
    match kind {
        AuthErrorKind::RateLimited => {
            FlowFeedback::notice("Too many attempts. Please wait a moment and try again.")
        }
        AuthErrorKind::Unexpected => {
            FlowFeedback::notice("Something went wrong. Please try again.")
        }
        AuthErrorKind::EmailUnverified => FlowFeedback::notice(
            "This email is registered but not verified. Use the email code option to sign in.",
        ),
        AuthErrorKind::DeviceUnregisterFailed => {
            FlowFeedback::notice("Could not sign out this device. Please try again.")
        }
        _ => FlowFeedback::notice("Something went wrong. Please try again."),
    }
}
