use std::fmt;
use std::path::PathBuf;

/// Chat platform a destination belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    Telegram,
    Slack,
}

impl Backend {
    /// Label used by the contact database's "Platform" select field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Telegram => "Telegram",
            Backend::Slack => "Slack",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination as entered by the caller, before resolution.
///
/// Group destinations carry a display name here; they are never sent to by
/// name and must first be resolved to a native numeric id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Telegram channel addressed by an opaque handle (`@name`, link, or id).
    TelegramChannel(String),
    /// Telegram group addressed by display name.
    TelegramGroup(String),
    /// Slack channel key; no resolution step required.
    SlackChannel(String),
}

impl Destination {
    pub fn backend(&self) -> Backend {
        match self {
            Destination::TelegramChannel(_) | Destination::TelegramGroup(_) => Backend::Telegram,
            Destination::SlackChannel(_) => Backend::Slack,
        }
    }
}

/// A single backend-addressable send target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// Opaque string handle, passed through to the backend unchanged.
    Channel(String),
    /// Resolved numeric conversation id.
    Group(i64),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Channel(handle) => f.write_str(handle),
            Recipient::Group(id) => write!(f, "{id}"),
        }
    }
}

/// One row of the live conversation listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub id: i64,
    pub name: String,
    pub is_group: bool,
}

/// Canonical (text, optional single attachment) content for one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentPayload {
    pub text: String,
    pub attachment: Option<PathBuf>,
}

impl ContentPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachment: None,
        }
    }

    /// A payload is sendable only if at least one field carries content.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }

    /// Caption for file sends; empty text means no caption at all.
    pub fn caption(&self) -> Option<&str> {
        if self.text.trim().is_empty() {
            None
        } else {
            Some(self.text.as_str())
        }
    }
}

/// Outcome of one send attempt. Exactly one is produced per recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient: Recipient,
    pub status: DeliveryStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

/// Aggregated result of one delivery batch, in attempt order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub ok: Vec<String>,
    pub errors: Vec<String>,
}

impl BatchResult {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome.status {
            DeliveryStatus::Delivered => self.ok.push(outcome.recipient.to_string()),
            DeliveryStatus::Failed(reason) => self
                .errors
                .push(format!("{}: {reason}", outcome.recipient)),
        }
    }

    pub fn attempted(&self) -> usize {
        self.ok.len() + self.errors.len()
    }

    pub fn is_full_success(&self) -> bool {
        !self.ok.is_empty() && self.errors.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.ok.is_empty() && !self.errors.is_empty()
    }

    pub fn is_full_failure(&self) -> bool {
        self.ok.is_empty()
    }
}
