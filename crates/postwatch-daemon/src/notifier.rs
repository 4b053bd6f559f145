//! Notification sinks
//!
//! The session hands every matched post to a [`PostNotifier`] and awaits it.
//! Failures are returned to the session, which logs and drops them.

use std::sync::Arc;

use async_trait::async_trait;
use libpostwatch_atproto::{ChatClient, LinkMessage, ProfileClient, XrpcError};
use libpostwatch_core::{Did, MatchedPost};
use thiserror::Error;
use tracing::{error, info};

/// Delivery failures; never fatal to the stream
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("chat delivery failed: {0}")]
    Chat(#[from] XrpcError),

    #[error("delivery task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for NotifyError {
    fn from(e: tokio::task::JoinError) -> Self {
        NotifyError::Task(e.to_string())
    }
}

/// Receives one call per created post
#[async_trait]
pub trait PostNotifier: Send + Sync {
    async fn notify(&self, post: &MatchedPost) -> Result<(), NotifyError>;
}

/// Headline used for every notification
pub fn headline(handle: &str) -> String {
    format!("🔔 New post from @{}", handle)
}

/// Current handle for `did`, or the DID itself when the lookup fails
fn display_handle(profiles: Option<&ProfileClient>, did: &Did) -> String {
    let Some(profiles) = profiles else {
        return did.to_string();
    };
    match profiles.handle_of(did) {
        Ok(handle) => handle,
        Err(e) => {
            error!(did = %did, error = %e, "Error getting handle for DID");
            did.to_string()
        }
    }
}

/// Prints matches to stdout and the log
pub struct LogNotifier {
    profiles: Option<ProfileClient>,
}

impl LogNotifier {
    pub fn new(profiles: Option<ProfileClient>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl PostNotifier for LogNotifier {
    async fn notify(&self, post: &MatchedPost) -> Result<(), NotifyError> {
        let profiles = self.profiles.clone();
        let did = post.repo.clone();
        let handle =
            tokio::task::spawn_blocking(move || display_handle(profiles.as_ref(), &did)).await?;

        let message = headline(&handle);
        let url = post.web_url();
        println!("{}\n{}", message, url);
        info!(repo = %post.repo, path = %post.path, url = %url, "New post");
        Ok(())
    }
}

/// Sends each match as a Bluesky chat direct message
pub struct ChatNotifier {
    chat: Arc<ChatClient>,
    recipient: Did,
    profiles: ProfileClient,
}

impl ChatNotifier {
    pub fn new(chat: Arc<ChatClient>, recipient: Did, profiles: ProfileClient) -> Self {
        Self {
            chat,
            recipient,
            profiles,
        }
    }
}

#[async_trait]
impl PostNotifier for ChatNotifier {
    async fn notify(&self, post: &MatchedPost) -> Result<(), NotifyError> {
        let chat = self.chat.clone();
        let recipient = self.recipient.clone();
        let profiles = self.profiles.clone();
        let post = post.clone();

        let message_id = tokio::task::spawn_blocking(move || {
            let handle = display_handle(Some(&profiles), &post.repo);
            let message = headline(&handle);
            let url = post.web_url();
            println!("{}\n{}", message, url);
            chat.send_link(&recipient, &LinkMessage::new(message, "View post", url))
        })
        .await??;

        info!(recipient = %self.recipient, message_id = %message_id, "Direct message sent");
        Ok(())
    }
}
