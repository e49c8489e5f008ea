use std::sync::Arc;

use tracing::info;

use crate::flow::{generic_notice, BusyAction, FlowConfig, FlowFeedback};
use crate::provider::classify::{classify, AuthErrorKind};
use crate::provider::{IdentityProvider, OtpOptions, SignOutScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStage {
    /// Ask which account to recover.
    Email,
    PreOtpLoader,
    Otp,
    /// Collect the replacement credential. The recovery session is never
    /// exposed as "logged in" to the user.
    Password,
    /// Credential updated and session revoked; redirect to login.
    PostLoader,
}

pub struct ResetFlow {
    provider: Arc<dyn IdentityProvider>,
    config: FlowConfig,

    stage: ResetStage,
    busy: Option<BusyAction>,
    saved_email: Option<String>,
    feedback: Option<FlowFeedback>,
}

impl ResetFlow {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: FlowConfig) -> Self {
        Self {
            provider,
            config,
            stage: ResetStage::Email,
            busy: None,
            saved_email: None,
            feedback: None,
        }
    }

    pub fn stage(&self) -> ResetStage {
        self.stage
    }

    pub fn busy(&self) -> Option<BusyAction> {
        self.busy
    }

    pub fn saved_email(&self) -> Option<&str> {
        self.saved_email.as_deref()
    }

    pub fn feedback(&self) -> Option<&FlowFeedback> {
        self.feedback.as_ref()
    }

    pub async fn submit_email(&mut self, email: &str) {
        if self.busy.is_some() || self.stage != ResetStage::Email {
            return;
        }
        self.busy = Some(BusyAction::OtpDispatch);
        self.feedback = None;

        // Recovery must not create accounts for unknown emails.
        let result = self
            .provider
            .sign_in_with_otp(email, OtpOptions { create_if_absent: false })
            .await;
        self.busy = None;

        match result {
            Ok(()) => {
                self.saved_email = Some(email.to_string());
                self.stage = ResetStage::PreOtpLoader;
            }
            Err(err) => match classify(&err) {
                AuthErrorKind::AccountNotFound => {
                    self.feedback = Some(FlowFeedback::field(
                        "email",
                        "No account exists for this email address.",
                    ));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    /// Pure timed transition; carries no business logic.
    pub async fn settle_loader(&mut self) {
        if self.stage == ResetStage::PreOtpLoader {
            tokio::time::sleep(self.config.loader_delay).await;
            self.stage = ResetStage::Otp;
        }
    }

    pub async fn verify_code(&mut self, code: &str) {
        if self.busy.is_some() || self.stage != ResetStage::Otp {
            return;
        }
        let Some(email) = self.saved_email.clone() else {
            self.feedback = Some(generic_notice(AuthErrorKind::Unexpected));
            return;
        };

        self.busy = Some(BusyAction::OtpVerify);
        self.feedback = None;

        let result = self.provider.verify_otp(&email, code).await;
        self.busy = None;

        match result {
            // Straight to credential entry; the session stays behind the
            // curtain until it is revoked below.
            Ok(_) => self.stage = ResetStage::Password,
            Err(err) => match classify(&err) {
                AuthErrorKind::CredentialRejected => {
                    self.feedback = Some(FlowFeedback::field("code", "Incorrect or expired code."));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    pub async fn submit_new_password(&mut self, new_password: &str) {
        if self.busy.is_some() || self.stage != ResetStage::Password {
            return;
        }

        if new_password.len() < self.config.min_password_len {
            self.feedback = Some(FlowFeedback::field(
                "password",
                format!(
                    "Password must be at least {} characters.",
                    self.config.min_password_len
                ),
            ));
            return;
        }

        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            _ => {
                self.feedback = Some(generic_notice(AuthErrorKind::Unexpected));
                return;
            }
        };

        self.busy = Some(BusyAction::PasswordUpdate);
        self.feedback = None;

        let updated = self
            .provider
            .update_password(&session.access_token, new_password)
            .await;

        match updated {
            Ok(()) => {
                // Force re-authentication with the new credential before the
                // final loader; the recovery session must not survive.
                self.busy = Some(BusyAction::SignOut);
                let signed_out = self
                    .provider
                    .sign_out(&session.access_token, SignOutScope::Global)
                    .await;
                self.busy = None;

                if let Err(err) = signed_out {
                    self.feedback = Some(generic_notice(classify(&err)));
                    return;
                }

                info!(user_id = session.user_id.as_str(), "password reset complete");
                self.stage = ResetStage::PostLoader;
            }
            Err(err) => {
                self.busy = None;
                self.feedback = Some(generic_notice(classify(&err)));
            }
        }
    }
}
