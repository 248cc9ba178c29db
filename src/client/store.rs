use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::Profile;
use crate::error::ClientError;
use crate::websocket::{ConnectionId, Envelope, MessageKind};

const CONVERSATIONS_KEY: &str = "conversations";
const CURRENT_USER_KEY: &str = "current_user";

/// One chat message as kept in a conversation and carried in an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from: String,
    #[serde(default)]
    pub from_name: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: MessageKind,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Identifier of the other party.
    pub id: String,
    pub title: String,
    pub created_at: i64,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Client-local key-value store with two records, `conversations` and
/// `current_user`, each a JSON file in `dir`.
#[derive(Debug)]
pub struct ConversationStore {
    dir: PathBuf,
    conversations: Vec<Conversation>,
    profile: Option<Profile>,
}

impl ConversationStore {
    /// Opens the store in `dir`, rehydrating whatever was saved before.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let conversations = read_record(&dir, CONVERSATIONS_KEY)?.unwrap_or_default();
        let profile = read_record(&dir, CURRENT_USER_KEY)?;
        Ok(Self { dir, conversations, profile })
    }

    pub fn save(&self) -> Result<(), ClientError> {
        write_record(&self.dir, CONVERSATIONS_KEY, &self.conversations)?;
        match &self.profile {
            Some(profile) => write_record(&self.dir, CURRENT_USER_KEY, profile)?,
            None => remove_record(&self.dir, CURRENT_USER_KEY)?,
        }
        Ok(())
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, peer: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == peer)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn set_profile(&mut self, profile: Option<Profile>) {
        self.profile = profile;
    }

    /// Signs in against the remembered profile. Only the email is compared;
    /// no password is ever stored.
    pub fn login(&self, email: &str, password: &str) -> Result<Profile, ClientError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ClientError::Validation(vec!["Provide email and password".to_string()]));
        }

        match &self.profile {
            Some(profile) if profile.email == email => {
                let name = if profile.name.is_empty() { "User" } else { profile.name.as_str() };
                Ok(Profile {
                    id: profile.id.clone(),
                    name: name.to_string(),
                    email: profile.email.clone(),
                })
            }
            _ => Err(ClientError::UnknownAccount),
        }
    }

    /// Appends `message` to the conversation with `peer`, starting one if
    /// needed.
    pub fn append(&mut self, peer: &str, title: &str, message: ChatMessage) -> &Conversation {
        let index = match self.conversations.iter().position(|c| c.id == peer) {
            Some(index) => index,
            None => {
                debug!("Starting conversation with {}", peer);
                self.conversations.push(Conversation {
                    id: peer.to_string(),
                    title: title.to_string(),
                    created_at: message.timestamp,
                    messages: Vec::new(),
                });
                self.conversations.len() - 1
            }
        };
        let conversation = &mut self.conversations[index];
        conversation.messages.push(message);
        conversation
    }

    /// Files a relayed envelope under its sender.
    pub fn record_incoming(&mut self, envelope: &Envelope) -> Result<&Conversation, ClientError> {
        let message: ChatMessage = envelope.decode()?;
        let peer = message.from.clone();
        let title = if message.from_name.is_empty() {
            peer.clone()
        } else {
            message.from_name.clone()
        };
        Ok(self.append(&peer, &title, message))
    }

    /// Conversations addressed to the given identifier. After a reconnect the
    /// peer has a new identifier and these can no longer reach them.
    pub fn is_stale(&self, peer: &str, online: &[ConnectionId]) -> bool {
        !online.iter().any(|id| id.to_string() == peer)
    }
}

fn record_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

fn read_record<T: DeserializeOwned>(dir: &Path, key: &str) -> Result<Option<T>, ClientError> {
    match fs::read_to_string(record_path(dir, key)) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // A corrupt record is treated like a missing one.
                warn!("Discarding unreadable {} record: {}", key, e);
                Ok(None)
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_record<T: Serialize>(dir: &Path, key: &str, value: &T) -> Result<(), ClientError> {
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(record_path(dir, key), raw)?;
    Ok(())
}

fn remove_record(dir: &Path, key: &str) -> Result<(), ClientError> {
    match fs::remove_file(record_path(dir, key)) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
