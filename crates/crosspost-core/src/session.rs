//! Lifecycle of the stateful backend connection.
//!
//! The session is the only long-lived shared resource in the relay: created
//! lazily on first use, reused for every later batch, torn down only at
//! process exit. Mutation (the login handshake) happens exclusively inside
//! [`SessionManager::get_session`]; afterwards the session is read-mostly
//! and sends go through its serialization gate.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::Backend,
    errors::Error,
    ports::{CodeOutcome, InputPrompt, LoginGateway, PromptKind, SendPort},
    Result,
};

/// Login progression. The machine suspends on user input at `AwaitingPhone`,
/// `AwaitingCode` and `AwaitingSecondFactor`; the second factor is only
/// entered when the backend asks for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginStage {
    Disconnected,
    Connecting,
    AwaitingPhone,
    AwaitingCode,
    AwaitingSecondFactor,
    Authenticated,
    Ready,
}

/// A long-lived handle to one authenticated backend connection.
///
/// Sends are serialized through `gate` because the underlying connection is
/// not safe for concurrent use. Sessions for different backends are
/// independent and run in parallel.
pub struct Session {
    backend: Backend,
    sender: Arc<dyn SendPort>,
    gate: Mutex<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(backend: Backend, sender: Arc<dyn SendPort>) -> Self {
        Self {
            backend,
            sender,
            gate: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn sender(&self) -> &dyn SendPort {
        self.sender.as_ref()
    }

    pub(crate) fn gate(&self) -> &Mutex<()> {
        &self.gate
    }
}

/// Application credentials for the stateful backend.
#[derive(Clone, Debug, Default)]
pub struct AppCredentials {
    /// Numeric application identifier, kept as the raw string the caller
    /// supplied.
    pub app_id: String,
    pub app_hash: String,
}

impl AppCredentials {
    /// Both strings must be present before any network attempt, and the id
    /// must be numeric.
    fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() || self.app_hash.trim().is_empty() {
            return Err(Error::CredentialsMissing("telegram api id/hash"));
        }
        if self.app_id.trim().parse::<i64>().is_err() {
            return Err(Error::Config(format!(
                "telegram api id is not numeric: {}",
                self.app_id
            )));
        }
        Ok(())
    }
}

/// Creates the backend session lazily and hands out the same instance for
/// the rest of the run.
///
/// The whole login runs under one lock, so concurrent first calls queue and
/// the handshake happens at most once per process. A failed login leaves
/// the manager disconnected; the next call starts a fresh handshake with a
/// new session object.
pub struct SessionManager {
    credentials: AppCredentials,
    gateway: Arc<dyn LoginGateway>,
    prompt: Arc<dyn InputPrompt>,
    sender: Arc<dyn SendPort>,
    cached: Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    pub fn new(
        credentials: AppCredentials,
        gateway: Arc<dyn LoginGateway>,
        prompt: Arc<dyn InputPrompt>,
        sender: Arc<dyn SendPort>,
    ) -> Self {
        Self {
            credentials,
            gateway,
            prompt,
            sender,
            cached: Mutex::new(None),
        }
    }

    /// Idempotent: the first call drives the login handshake, later calls
    /// return the cached session.
    pub async fn get_session(&self) -> Result<Arc<Session>> {
        let mut cached = self.cached.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }

        let session = self.login().await.map_err(|e| {
            warn!(stage = ?LoginStage::Disconnected, error = %e, "login aborted");
            e
        })?;
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn login(&self) -> Result<Arc<Session>> {
        self.credentials.validate()?;

        debug!(stage = ?LoginStage::Connecting, "connecting");
        self.gateway.connect().await?;

        if self.gateway.is_authorized().await? {
            // A persisted session is still valid; skip the handshake.
            debug!(stage = ?LoginStage::Ready, "reusing persisted session");
            return Ok(Arc::new(Session::new(Backend::Telegram, self.sender.clone())));
        }

        match self.interactive_login().await {
            Ok(()) => {}
            // Pre-network aborts keep their own identity.
            Err(e @ Error::PhoneRequired) => return Err(e),
            Err(e) => return Err(Error::LoginFailed(e.to_string())),
        }

        debug!(stage = ?LoginStage::Authenticated, "persisting session");
        self.gateway.persist().await?;

        info!(stage = ?LoginStage::Ready, "login complete");
        Ok(Arc::new(Session::new(Backend::Telegram, self.sender.clone())))
    }

    async fn interactive_login(&self) -> Result<()> {
        debug!(stage = ?LoginStage::AwaitingPhone, "requesting phone");
        let phone = self.prompt.request_input(PromptKind::Phone).await?;
        let phone = phone.trim().to_string();
        if phone.is_empty() {
            return Err(Error::PhoneRequired);
        }

        self.gateway.request_code(&phone).await?;

        debug!(stage = ?LoginStage::AwaitingCode, "requesting login code");
        let code = self.prompt.request_input(PromptKind::LoginCode).await?;

        match self.gateway.submit_code(&phone, code.trim()).await? {
            CodeOutcome::Accepted => {}
            CodeOutcome::PasswordNeeded => {
                debug!(stage = ?LoginStage::AwaitingSecondFactor, "requesting password");
                let password = self.prompt.request_input(PromptKind::Password).await?;
                self.gateway.submit_password(&password).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{ContentPayload, Recipient};

    struct NoopSender;

    #[async_trait]
    impl SendPort for NoopSender {
        async fn send(&self, _recipient: &Recipient, _payload: &ContentPayload) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        authorized: bool,
        password_needed: bool,
        fail_code: bool,
        connects: AtomicUsize,
        code_requests: AtomicUsize,
        persists: AtomicUsize,
        passwords: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LoginGateway for FakeGateway {
        async fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_authorized(&self) -> Result<bool> {
            Ok(self.authorized)
        }

        async fn request_code(&self, _phone: &str) -> Result<()> {
            self.code_requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn submit_code(&self, _phone: &str, _code: &str) -> Result<CodeOutcome> {
            if self.fail_code {
                return Err(Error::External("PHONE_CODE_INVALID".to_string()));
            }
            if self.password_needed {
                Ok(CodeOutcome::PasswordNeeded)
            } else {
                Ok(CodeOutcome::Accepted)
            }
        }

        async fn submit_password(&self, password: &str) -> Result<()> {
            self.passwords.lock().unwrap().push(password.to_string());
            Ok(())
        }

        async fn persist(&self) -> Result<()> {
            self.persists.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakePrompt {
        phone: String,
        asked: StdMutex<Vec<PromptKind>>,
    }

    impl FakePrompt {
        fn with_phone(phone: &str) -> Self {
            Self {
                phone: phone.to_string(),
                asked: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl InputPrompt for FakePrompt {
        async fn request_input(&self, kind: PromptKind) -> Result<String> {
            self.asked.lock().unwrap().push(kind);
            Ok(match kind {
                PromptKind::Phone => self.phone.clone(),
                PromptKind::LoginCode => "12345".to_string(),
                PromptKind::Password => "hunter2".to_string(),
            })
        }
    }

    fn creds() -> AppCredentials {
        AppCredentials {
            app_id: "12345".to_string(),
            app_hash: "abcdef".to_string(),
        }
    }

    fn manager(gateway: Arc<FakeGateway>, prompt: Arc<FakePrompt>) -> SessionManager {
        SessionManager::new(creds(), gateway, prompt, Arc::new(NoopSender))
    }

    #[tokio::test]
    async fn get_session_is_idempotent_and_logs_in_once() {
        let gateway = Arc::new(FakeGateway {
            authorized: true,
            ..FakeGateway::default()
        });
        let prompt = Arc::new(FakePrompt::with_phone("+1555"));
        let mgr = manager(gateway.clone(), prompt.clone());

        let first = mgr.get_session().await.unwrap();
        let second = mgr.get_session().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gateway.connects.load(Ordering::SeqCst), 1);
        assert!(prompt.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_network_attempt() {
        let gateway = Arc::new(FakeGateway::default());
        let prompt = Arc::new(FakePrompt::with_phone("+1555"));
        let mgr = SessionManager::new(
            AppCredentials::default(),
            gateway.clone(),
            prompt,
            Arc::new(NoopSender),
        );

        let err = mgr.get_session().await.unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing(_)));
        assert_eq!(gateway.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_phone_fails_with_phone_required() {
        let gateway = Arc::new(FakeGateway::default());
        let prompt = Arc::new(FakePrompt::with_phone("   "));
        let mgr = manager(gateway.clone(), prompt);

        let err = mgr.get_session().await.unwrap_err();
        assert!(matches!(err, Error::PhoneRequired));
        assert_eq!(gateway.code_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_factor_is_prompted_only_when_signalled() {
        let gateway = Arc::new(FakeGateway {
            password_needed: true,
            ..FakeGateway::default()
        });
        let prompt = Arc::new(FakePrompt::with_phone("+1555"));
        let mgr = manager(gateway.clone(), prompt.clone());

        mgr.get_session().await.unwrap();

        let asked = prompt.asked.lock().unwrap().clone();
        assert_eq!(
            asked,
            vec![PromptKind::Phone, PromptKind::LoginCode, PromptKind::Password]
        );
        assert_eq!(gateway.passwords.lock().unwrap().as_slice(), ["hunter2"]);
        assert_eq!(gateway.persists.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_code_surfaces_as_login_failed_and_allows_retry() {
        let gateway = Arc::new(FakeGateway {
            fail_code: true,
            ..FakeGateway::default()
        });
        let prompt = Arc::new(FakePrompt::with_phone("+1555"));
        let mgr = manager(gateway.clone(), prompt);

        let err = mgr.get_session().await.unwrap_err();
        assert!(matches!(err, Error::LoginFailed(_)));
        assert_eq!(gateway.persists.load(Ordering::SeqCst), 0);

        // The manager is back to disconnected; a new attempt starts over.
        let err = mgr.get_session().await.unwrap_err();
        assert!(matches!(err, Error::LoginFailed(_)));
        assert_eq!(gateway.connects.load(Ordering::SeqCst), 2);
    }
}
