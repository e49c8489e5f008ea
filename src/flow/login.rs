use std::sync::Arc;

use tracing::{info, warn};

use crate::client::DeviceRegistry;
use crate::device::DeviceIdentity;
use crate::flow::{generic_notice, BusyAction, FlowConfig, FlowFeedback};
use crate::provider::classify::{classify, AuthErrorKind};
use crate::provider::{IdentityProvider, OtpOptions, ProviderSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Password form.
    Login,
    /// Code-based entry: ask for the email to send a code to.
    MagicEmail,
    /// UI-smoothing pause between dispatch and code entry.
    PreOtpLoader,
    Otp,
    PostOtpLoader,
    Done,
}

pub struct LoginFlow {
    provider: Arc<dyn IdentityProvider>,
    registry: Arc<dyn DeviceRegistry>,
    device: Arc<DeviceIdentity>,
    config: FlowConfig,

    stage: LoginStage,
    busy: Option<BusyAction>,
    saved_email: Option<String>,
    feedback: Option<FlowFeedback>,
}

impl LoginFlow {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn DeviceRegistry>,
        device: Arc<DeviceIdentity>,
        config: FlowConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            device,
            config,
            stage: LoginStage::Login,
            busy: None,
            saved_email: None,
            feedback: None,
        }
    }

    /// Entry shortcut: arriving from an "email already exists" redirect jumps
    /// straight into the code path, exactly once.
    pub fn with_prefilled_email(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn DeviceRegistry>,
        device: Arc<DeviceIdentity>,
        config: FlowConfig,
        email: &str,
    ) -> Self {
        let mut flow = Self::new(provider, registry, device, config);
        flow.stage = LoginStage::MagicEmail;
        flow.saved_email = Some(email.to_string());
        flow
    }

    pub fn stage(&self) -> LoginStage {
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

    /// User opts into code-based login.
    pub fn use_email_code(&mut self) {
        if self.stage == LoginStage::Login && self.busy.is_none() {
            self.stage = LoginStage::MagicEmail;
            self.feedback = None;
        }
    }

    /// Explicit back action to the password form.
    pub fn back_to_password(&mut self) {
        if self.stage == LoginStage::MagicEmail && self.busy.is_none() {
            self.stage = LoginStage::Login;
            self.feedback = None;
        }
    }

    pub async fn submit_password(&mut self, email: &str, password: &str) {
        if self.busy.is_some() || self.stage != LoginStage::Login {
            return;
        }
        self.busy = Some(BusyAction::PasswordSignIn);
        self.feedback = None;

        let result = self.provider.sign_in_with_password(email, password).await;
        self.busy = None;

        match result {
            Ok(session) => self.finish(session).await,
            Err(err) => match classify(&err) {
                AuthErrorKind::CredentialRejected => {
                    self.feedback =
                        Some(FlowFeedback::field("password", "Incorrect email or password."));
                }
                // Registered but never confirmed: steer to the code path
                // instead of letting them retry the password.
                kind @ AuthErrorKind::EmailUnverified => {
                    self.saved_email = Some(email.to_string());
                    self.feedback = Some(generic_notice(kind));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    pub async fn send_code(&mut self, email: &str) {
        if self.busy.is_some() || self.stage != LoginStage::MagicEmail {
            return;
        }
        self.busy = Some(BusyAction::OtpDispatch);
        self.feedback = None;

        // Preflight semantics: never mint an account from the login screen.
        let result = self
            .provider
            .sign_in_with_otp(email, OtpOptions { create_if_absent: false })
            .await;
        self.busy = None;

        match result {
            Ok(()) => {
                self.saved_email = Some(email.to_string());
                self.stage = LoginStage::PreOtpLoader;
            }
            Err(err) => match classify(&err) {
                AuthErrorKind::AccountNotFound => {
                    self.feedback = Some(FlowFeedback::notice(
                        "No account exists for this email address.",
                    ));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    /// Pure timed transition; carries no business logic.
    pub async fn settle_loader(&mut self) {
        if self.stage == LoginStage::PreOtpLoader {
            tokio::time::sleep(self.config.loader_delay).await;
            self.stage = LoginStage::Otp;
        }
    }

    pub async fn verify_code(&mut self, code: &str) {
        if self.busy.is_some() || self.stage != LoginStage::Otp {
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
                self.stage = LoginStage::PostOtpLoader;
                self.finish(session).await;
            }
            Err(err) => match classify(&err) {
                AuthErrorKind::CredentialRejected => {
                    self.feedback = Some(FlowFeedback::field("code", "Incorrect or expired code."));
                }
                kind => self.feedback = Some(generic_notice(kind)),
            },
        }
    }

    /// Shared tail: record this device in the registry, then the flow is done.
    async fn finish(&mut self, session: ProviderSession) {
        let device_id = self.device.get_or_create();

        if !device_id.is_empty() {
            if let Err(err) = self
                .registry
                .register(&session.access_token, device_id.as_str())
                .await
            {
                // Completing without a registry row would get this client
                // bounced by the device-count backstop right away.
                warn!(error = %err, "device registration failed after sign-in");
                self.stage = LoginStage::Login;
                self.feedback = Some(generic_notice(AuthErrorKind::Unexpected));
                return;
            }
        }

        info!(user_id = session.user_id.as_str(), "login complete");
        self.stage = LoginStage::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryCookieStore;
    use crate::testutil::{MockProvider, MockRegistry, MOCK_OTP_CODE};
    use std::time::Duration;

    fn quick_config() -> FlowConfig {
        FlowConfig {
            loader_delay: Duration::from_millis(1),
            ..FlowConfig::default()
        }
    }

    fn flow_with(provider: MockProvider) -> (LoginFlow, Arc<MockProvider>, Arc<MockRegistry>) {
        let provider = Arc::new(provider);
        let registry = Arc::new(MockRegistry::new());
        let device = Arc::new(DeviceIdentity::new(Box::new(MemoryCookieStore::new())));
        let flow = LoginFlow::new(
            provider.clone(),
            registry.clone(),
            device,
            quick_config(),
        );
        (flow, provider, registry)
    }

    #[tokio::test]
    async fn password_login_registers_device_and_completes() {
        let (mut flow, _provider, registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));

        flow.submit_password("a@x.com", "hunter22").await;

        assert_eq!(flow.stage(), LoginStage::Done);
        assert!(flow.feedback().is_none());
        assert_eq!(
            registry
                .device_count("tok-a@x.com")
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn wrong_password_stays_on_login_with_field_error() {
        let (mut flow, _provider, _registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));

        flow.submit_password("a@x.com", "wrong").await;

        assert_eq!(flow.stage(), LoginStage::Login);
        assert!(matches!(
            flow.feedback(),
            Some(FlowFeedback::FieldError { field: "password", .. })
        ));
    }

    #[tokio::test]
    async fn unverified_email_steers_to_code_path() {
        let (mut flow, _provider, _registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", false));

        flow.submit_password("a@x.com", "hunter22").await;

        assert_eq!(flow.stage(), LoginStage::Login);
        assert!(matches!(flow.feedback(), Some(FlowFeedback::Notice { .. })));
        assert_eq!(flow.saved_email(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn code_login_end_to_end() {
        let (mut flow, provider, registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));

        flow.use_email_code();
        assert_eq!(flow.stage(), LoginStage::MagicEmail);

        flow.send_code("a@x.com").await;
        assert_eq!(flow.stage(), LoginStage::PreOtpLoader);
        // dispatch never auto-creates accounts from the login screen
        assert_eq!(
            provider.otp_dispatches.lock().unwrap().as_slice(),
            &[("a@x.com".to_string(), false)]
        );

        flow.settle_loader().await;
        assert_eq!(flow.stage(), LoginStage::Otp);

        flow.verify_code(MOCK_OTP_CODE).await;
        assert_eq!(flow.stage(), LoginStage::Done);
        assert_eq!(registry.device_count("tok-a@x.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_email_is_terminal_on_dispatch() {
        let (mut flow, _provider, _registry) = flow_with(MockProvider::new());

        flow.use_email_code();
        flow.send_code("ghost@x.com").await;

        assert_eq!(flow.stage(), LoginStage::MagicEmail);
        assert!(matches!(flow.feedback(), Some(FlowFeedback::Notice { .. })));
    }

    #[tokio::test]
    async fn bad_code_stays_on_otp() {
        let (mut flow, _provider, _registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));

        flow.use_email_code();
        flow.send_code("a@x.com").await;
        flow.settle_loader().await;

        flow.verify_code("000000").await;

        assert_eq!(flow.stage(), LoginStage::Otp);
        assert!(matches!(
            flow.feedback(),
            Some(FlowFeedback::FieldError { field: "code", .. })
        ));
    }

    #[tokio::test]
    async fn prefilled_email_enters_magic_email_once() {
        let provider = Arc::new(MockProvider::new().with_account("a@x.com", "pw", true));
        let registry = Arc::new(MockRegistry::new());
        let device = Arc::new(DeviceIdentity::new(Box::new(MemoryCookieStore::new())));

        let flow = LoginFlow::with_prefilled_email(
            provider,
            registry,
            device,
            quick_config(),
            "a@x.com",
        );

        assert_eq!(flow.stage(), LoginStage::MagicEmail);
        assert_eq!(flow.saved_email(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn submit_while_busy_is_ignored() {
        // Busy is cleared before submit_password returns, so exercise the
        // guard directly: a flow marked busy must ignore a second submit.
        let (mut flow, _provider, _registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));

        flow.busy = Some(BusyAction::OtpDispatch);
        flow.submit_password("a@x.com", "hunter22").await;

        assert_eq!(flow.stage(), LoginStage::Login);
        assert_eq!(flow.busy(), Some(BusyAction::OtpDispatch));
    }

    #[tokio::test]
    async fn rate_limit_is_a_notice_not_a_field_error() {
        let (mut flow, provider, _registry) =
            flow_with(MockProvider::new().with_account("a@x.com", "hunter22", true));
        provider
            .rate_limited
            .store(true, std::sync::atomic::Ordering::SeqCst);

        flow.submit_password("a@x.com", "hunter22").await;

        assert_eq!(flow.stage(), LoginStage::Login);
        assert!(matches!(flow.feedback(), Some(FlowFeedback::Notice { .. })));
    }
}
