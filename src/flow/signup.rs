use std::sync::Arc;

use tracing::{info, warn};

use crate::client::DeviceRegistry;
use crate::device::DeviceIdentity;
use crate::flow::{generic_notice, BusyAction, FlowFeedback};
use crate::provider::classify::{classify, AuthErrorKind};
use crate::provider::{IdentityProvider, OtpOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupStage {
    /// Password form.
    Signup,
    /// Email-only entry: no password, code sign-in from the start.
    EmailOtp,
    Otp,
    Redirect(RedirectTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// This email already has an account; hand over to login with the email
    /// carried along so it doesn't have to be typed again.
    Login { prefilled_email: String },
    App,
}

pub struct SignupFlow {
    provider: Arc<dyn IdentityProvider>,
    registry: Arc<dyn DeviceRegistry>,
    device: Arc<DeviceIdentity>,

    stage: SignupStage,
    busy: Option<BusyAction>,
    saved_email: Option<String>,
    feedback: Option<FlowFeedback>,
}

impl SignupFlow {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn DeviceRegistry>,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        Self {
            provider,
            registry,
            device,
            stage: SignupStage::Signup,
            busy: None,
            saved_email: None,
            feedback: None,
        }
    }

    pub fn stage(&self) -> &SignupStage {
        &self.stage
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

    pub fn use_email_only(&mut self) {
        if self.stage == SignupStage::Signup && self.busy.is_none() {
            self.stage = SignupStage::EmailOtp;
            self.feedback = None;
        }
    }

    pub fn back_to_signup(&mut self) {
        if self.stage == SignupStage::EmailOtp && self.busy.is_none() {
            self.stage = SignupStage::Signup;
            self.feedback = None;
        }
    }

    pub async fn submit_signup(&mut self, email: &str, password: &str) {
        if self.busy.is_some() || self.stage != SignupStage::Signup {
            return;
        }
        self.busy = Some(BusyAction::SignUp);
        self.feedback = None;

        let result = self.provider.sign_up(email, password).await;
        self.busy = None;

        match result {
            // The provider hides duplicates behind a "successful" response
            // carrying no identities. Same outcome as the explicit error.
            Ok(user) if user.identities.is_empty() => {
                self.feedback = Some(FlowFeedback::notice(
                    "An account with this email already exists. Try signing in instead.",
                ));
            }
            Ok(_) => {
                self.busy = Some(BusyAction::OtpDispatch);
                let dispatched = self
                    .provider
                    .sign_in_with_otp(email, OtpOptions { create_if_absent: true })
                    .await;
                self.busy = None;

                match dispatched {
                    Ok(()) => {
                        self.saved_email = Some(email.to_string());
                        self.stage = SignupStage::Otp;
                    }
                    Err(err) => self.feedback = Some(generic_notice(classify(&err))),
                }
            }
            Err(err) => match classify(&err) {
                AuthErrorKind::DuplicateAccount => {
                    self.feedback = Some(FlowFeedback::notice(
                        "An account with this email already exists. Try signing in instead.",
                    ));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    /// Email-only path. The preflight dispatch refuses to create accounts so
    /// a success tells us the email is already registered.
    pub async fn submit_email(&mut self, email: &str) {
        if self.busy.is_some() || self.stage != SignupStage::EmailOtp {
            return;
        }
        self.busy = Some(BusyAction::OtpDispatch);
        self.feedback = None;

        let preflight = self
            .provider
            .sign_in_with_otp(email, OtpOptions { create_if_absent: false })
            .await;

        match preflight {
            Ok(()) => {
                self.busy = None;
                self.stage = SignupStage::Redirect(RedirectTarget::Login {
                    prefilled_email: email.to_string(),
                });
            }
            Err(err) if classify(&err) == AuthErrorKind::AccountNotFound => {
                // Fresh email: dispatch again, this time creating the account.
                let dispatched = self
                    .provider
                    .sign_in_with_otp(email, OtpOptions { create_if_absent: true })
                    .await;
                self.busy = None;

                match dispatched {
                    Ok(()) => {
                        self.saved_email = Some(email.to_string());
                        self.stage = SignupStage::Otp;
                    }
                    Err(err) => self.feedback = Some(generic_notice(classify(&err))),
                }
            }
            Err(err) => {
                // Terminal for this attempt; no retry loop.
                self.busy = None;
                self.feedback = Some(generic_notice(classify(&err)));
            }
        }
    }

    pub async fn verify_code(&mut self, code: &str) {
        if self.busy.is_some() || self.stage != SignupStage::Otp {
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
            Ok(session) => {
                let device_id = self.device.get_or_create();
                if !device_id.is_empty() {
                    if let Err(err) = self
                        .registry
                        .register(&session.access_token, device_id.as_str())
                        .await
                    {
                        warn!(error = %err, "device registration failed after signup");
                        self.feedback = Some(generic_notice(AuthErrorKind::Unexpected));
                        return;
                    }
                }
                info!(user_id = session.user_id.as_str(), "signup complete");
                self.stage = SignupStage::Redirect(RedirectTarget::App);
            }
            Err(err) => match classify(&err) {
                AuthErrorKind::CredentialRejected => {
                    self.feedback = Some(FlowFeedback::field("code", "Incorrect or expired code."));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }
}
