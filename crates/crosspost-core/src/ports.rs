//! Boundary traits for the external collaborators.
//!
//! Every external collaborator (the two chat backends, the contact
//! database, the document source, the user) sits behind one of these ports
//! so the orchestration layer stays testable with in-process fakes.

use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{Backend, ContentPayload, Conversation, Recipient},
    Result,
};

/// Outbound send primitive for one backend.
///
/// One call is one attempt: an attachment goes out as a file with the text
/// as caption (caption omitted when the text is empty), otherwise plain
/// text. Implementations must not retry.
#[async_trait]
pub trait SendPort: Send + Sync {
    async fn send(&self, recipient: &Recipient, payload: &ContentPayload) -> Result<()>;
}

/// Live conversation listing used for group-name resolution.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;
}

/// What [`LoginGateway::submit_code`] reported back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeOutcome {
    Accepted,
    /// The account has a password-based second factor.
    PasswordNeeded,
}

/// Authentication surface of the stateful backend connection.
#[async_trait]
pub trait LoginGateway: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn is_authorized(&self) -> Result<bool>;
    async fn request_code(&self, phone: &str) -> Result<()>;
    async fn submit_code(&self, phone: &str, code: &str) -> Result<CodeOutcome>;
    async fn submit_password(&self, password: &str) -> Result<()>;
    /// Persist the authenticated session for the fast path on the next run.
    async fn persist(&self) -> Result<()>;
}

/// Input the login handshake suspends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Phone,
    LoginCode,
    Password,
}

/// Pluggable user-input capability for the login handshake.
///
/// The session manager calls this at its suspension points; a GUI can back
/// it with a dialog, the CLI backs it with stdin.
#[async_trait]
pub trait InputPrompt: Send + Sync {
    async fn request_input(&self, kind: PromptKind) -> Result<String>;
}

/// Read-only contact database used for tag-based destination selection.
#[async_trait]
pub trait ContactLookup: Send + Sync {
    /// Contact identifiers for `backend` whose category matches any of
    /// `tags` (OR-combined).
    async fn contacts(&self, backend: Backend, tags: &[String]) -> Result<Vec<String>>;

    /// All category labels the database knows about.
    async fn categories(&self) -> Result<Vec<String>>;
}

/// One content block of a remote document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Text { runs: Vec<String> },
    Image { url: String },
}

/// Ordered block listing of a remote document. Only the first page is
/// fetched.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn list_blocks(&self, document_id: &str) -> Result<Vec<Block>>;
}

/// Fetches a URL into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Caller-visible "send in progress" toggle (a UI button, a CLI spinner).
///
/// `deliver_all` flips this on while a batch holds its session and
/// guarantees it flips back off on every exit path.
pub trait SendGate: Send + Sync {
    fn set_busy(&self, busy: bool);
}

/// Gate for callers with nothing to disable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullGate;

impl SendGate for NullGate {
    fn set_busy(&self, _busy: bool) {}
}
