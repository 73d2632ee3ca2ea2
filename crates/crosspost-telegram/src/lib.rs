//! Telegram adapter (grammers).
//!
//! Implements the core login gateway, directory, and send port over the
//! MTProto user client. The client only ever makes outbound calls; it is
//! never polled for updates, so no background event consumption runs.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use grammers_client::types::{Chat, LoginToken, PasswordToken};
use grammers_client::{Client, Config as ClientConfig, InitParams, InputMessage, SignInError};
use grammers_session::{PackedChat, Session as TgSession};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crosspost_core::{
    domain::{ContentPayload, Conversation, Recipient},
    errors::Error,
    ports::{CodeOutcome, Directory, LoginGateway, SendPort},
    Result,
};

/// One Telegram user-client connection plus the auth state the login
/// handshake threads through it.
pub struct TelegramGateway {
    api_id: String,
    api_hash: String,
    session_file: PathBuf,
    state: Mutex<GatewayState>,
}

#[derive(Default)]
struct GatewayState {
    client: Option<Client>,
    login_token: Option<LoginToken>,
    password_token: Option<PasswordToken>,
    /// Packed peers seen while listing dialogs; numeric recipients are
    /// addressed through this cache.
    peers: HashMap<i64, PackedChat>,
}

impl TelegramGateway {
    pub fn new(
        api_id: impl Into<String>,
        api_hash: impl Into<String>,
        session_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api_id: api_id.into(),
            api_hash: api_hash.into(),
            session_file: session_file.into(),
            state: Mutex::new(GatewayState::default()),
        }
    }

    async fn client(&self) -> Result<Client> {
        self.state
            .lock()
            .await
            .client
            .clone()
            .ok_or_else(|| Error::External("telegram client is not connected".to_string()))
    }

    async fn packed_peer(&self, id: i64) -> Option<PackedChat> {
        self.state.lock().await.peers.get(&id).copied()
    }

    async fn resolve_peer(&self, client: &Client, recipient: &Recipient) -> Result<PackedChat> {
        let id = match recipient {
            Recipient::Group(id) => *id,
            Recipient::Channel(handle) => {
                let handle = handle.trim();
                match handle.parse::<i64>() {
                    Ok(id) => id,
                    Err(_) => {
                        let name = handle
                            .trim_start_matches("https://t.me/")
                            .trim_start_matches("t.me/")
                            .trim_start_matches('@');
                        let chat: Chat = client
                            .resolve_username(name)
                            .await
                            .map_err(|e| Error::External(format!("resolve {handle}: {e}")))?
                            .ok_or_else(|| {
                                Error::External(format!("unknown channel: {handle}"))
                            })?;
                        return Ok(chat.pack());
                    }
                }
            }
        };

        if let Some(peer) = self.packed_peer(id).await {
            return Ok(peer);
        }

        // Not seen this run; one listing pass warms the peer cache.
        self.list_conversations().await?;
        self.packed_peer(id)
            .await
            .ok_or_else(|| Error::External(format!("no dialog with id {id}")))
    }
}

#[async_trait]
impl LoginGateway for TelegramGateway {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.client.is_some() {
            return Ok(());
        }

        let api_id: i32 = self.api_id.trim().parse().map_err(|_| {
            Error::Config(format!("telegram api id is not numeric: {}", self.api_id))
        })?;

        let session = TgSession::load_file_or_create(&self.session_file).map_err(Error::Io)?;
        let client = Client::connect(ClientConfig {
            session,
            api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams {
                // Outbound calls only; never catch up on missed updates.
                catch_up: false,
                ..Default::default()
            },
        })
        .await
        .map_err(|e| Error::External(format!("telegram connect: {e}")))?;

        info!("telegram client connected");
        state.client = Some(client);
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool> {
        let client = self.client().await?;
        client
            .is_authorized()
            .await
            .map_err(|e| Error::External(format!("telegram authorization check: {e}")))
    }

    async fn request_code(&self, phone: &str) -> Result<()> {
        let client = self.client().await?;
        let token = client
            .request_login_code(phone)
            .await
            .map_err(|e| Error::External(format!("request login code: {e}")))?;
        self.state.lock().await.login_token = Some(token);
        Ok(())
    }

    async fn submit_code(&self, _phone: &str, code: &str) -> Result<CodeOutcome> {
        let client = self.client().await?;
        let token = self
            .state
            .lock()
            .await
            .login_token
            .take()
            .ok_or_else(|| Error::External("no pending login code request".to_string()))?;

        match client.sign_in(&token, code).await {
            Ok(user) => {
                info!(user = user.id(), "signed in");
                Ok(CodeOutcome::Accepted)
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                self.state.lock().await.password_token = Some(password_token);
                Ok(CodeOutcome::PasswordNeeded)
            }
            Err(e) => Err(Error::External(format!("sign in: {e}"))),
        }
    }

    async fn submit_password(&self, password: &str) -> Result<()> {
        let client = self.client().await?;
        let token = self
            .state
            .lock()
            .await
            .password_token
            .take()
            .ok_or_else(|| Error::External("no pending password challenge".to_string()))?;

        let user = client
            .check_password(token, password)
            .await
            .map_err(|e| Error::External(format!("second factor: {e}")))?;
        info!(user = user.id(), "signed in with second factor");
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .session()
            .save_to_file(&self.session_file)
            .map_err(Error::Io)?;
        debug!(file = %self.session_file.display(), "session persisted");
        Ok(())
    }
}

#[async_trait]
impl Directory for TelegramGateway {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let client = self.client().await?;
        let mut dialogs = client.iter_dialogs();

        let mut out = Vec::new();
        let mut peers = HashMap::new();
        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| Error::External(format!("list dialogs: {e}")))?
        {
            let chat = dialog.chat();
            peers.insert(chat.id(), chat.pack());
            out.push(Conversation {
                id: chat.id(),
                name: chat.name().to_string(),
                is_group: matches!(chat, Chat::Group(_)),
            });
        }

        debug!(count = out.len(), "dialogs listed");
        self.state.lock().await.peers.extend(peers);
        Ok(out)
    }
}

#[async_trait]
impl SendPort for TelegramGateway {
    async fn send(&self, recipient: &Recipient, payload: &ContentPayload) -> Result<()> {
        let client = self.client().await?;
        let peer = self.resolve_peer(&client, recipient).await?;

        match &payload.attachment {
            Some(path) => {
                let uploaded = client
                    .upload_file(path)
                    .await
                    .map_err(|e| Error::External(format!("upload: {e}")))?;
                let message =
                    InputMessage::text(payload.caption().unwrap_or_default()).document(uploaded);
                client
                    .send_message(peer, message)
                    .await
                    .map_err(|e| Error::External(format!("send file: {e}")))?;
            }
            None => {
                client
                    .send_message(peer, InputMessage::text(payload.text.as_str()))
                    .await
                    .map_err(|e| Error::External(format!("send message: {e}")))?;
            }
        }
        Ok(())
    }
}
