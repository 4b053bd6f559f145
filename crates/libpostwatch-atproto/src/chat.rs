//! Bluesky chat direct messages
//!
//! The client logs in once at construction and is then shared by whoever
//! delivers notifications. Chat calls go through the account's PDS with the
//! `atproto-proxy` header pointing at the chat service.

use std::sync::{Mutex, PoisonError};

use libpostwatch_core::{ChatCredentials, Did};
use serde::{Deserialize, Serialize};

use crate::error::XrpcError;
use crate::xrpc::XrpcClient;
use crate::CHAT_PROXY;

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const GET_CONVO_FOR_MEMBERS: &str = "chat.bsky.convo.getConvoForMembers";
const SEND_MESSAGE: &str = "chat.bsky.convo.sendMessage";
const LINK_FACET_TYPE: &str = "app.bsky.richtext.facet#link";

/// A text message followed by a blank line and a labelled link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub text: String,
    pub link_label: String,
    pub url: String,
}

impl LinkMessage {
    pub fn new(text: impl Into<String>, link_label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link_label: link_label.into(),
            url: url.into(),
        }
    }

    fn to_input(&self) -> MessageInput {
        let mut text = format!("{}\n\n", self.text);
        let byte_start = text.len();
        text.push_str(&self.link_label);
        let byte_end = text.len();

        MessageInput {
            text,
            facets: vec![Facet {
                index: ByteSlice {
                    byte_start,
                    byte_end,
                },
                features: vec![LinkFeature {
                    kind: LINK_FACET_TYPE,
                    uri: self.url.clone(),
                }],
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageInput {
    text: String,
    facets: Vec<Facet>,
}

#[derive(Debug, Serialize)]
struct Facet {
    index: ByteSlice,
    features: Vec<LinkFeature>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ByteSlice {
    byte_start: usize,
    byte_end: usize,
}

#[derive(Debug, Serialize)]
struct LinkFeature {
    #[serde(rename = "$type")]
    kind: &'static str,
    uri: String,
}

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionOutput {
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct ConvoOutput {
    convo: ConvoView,
}

#[derive(Deserialize)]
struct ConvoView {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageInput<'a> {
    convo_id: &'a str,
    message: MessageInput,
}

#[derive(Deserialize)]
struct SendMessageOutput {
    id: String,
}

/// Logged-in chat client
pub struct ChatClient {
    client: XrpcClient,
    identifier: String,
    password: String,
    account: String,
    access_jwt: Mutex<String>,
}

impl ChatClient {
    /// Log in to the PDS named in `credentials`
    pub fn login(credentials: &ChatCredentials) -> Result<Self, XrpcError> {
        let client = XrpcClient::new(&credentials.pds_url);
        let session = create_session(&client, &credentials.handle, &credentials.password)?;

        Ok(Self {
            client,
            identifier: credentials.handle.clone(),
            password: credentials.password.clone(),
            account: session.did,
            access_jwt: Mutex::new(session.access_jwt),
        })
    }

    /// DID of the logged-in sender account
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Send `message` to `recipient`, returning the new message id
    pub fn send_link(&self, recipient: &Did, message: &LinkMessage) -> Result<String, XrpcError> {
        let convo: ConvoOutput = self.authorized(|auth| {
            self.client.query(
                GET_CONVO_FOR_MEMBERS,
                &[("members", recipient.as_str())],
                &[("Authorization", auth), ("atproto-proxy", CHAT_PROXY)],
            )
        })?;

        let sent: SendMessageOutput = self.authorized(|auth| {
            self.client.procedure(
                SEND_MESSAGE,
                &SendMessageInput {
                    convo_id: &convo.convo.id,
                    message: message.to_input(),
                },
                &[("Authorization", auth), ("atproto-proxy", CHAT_PROXY)],
            )
        })?;
        Ok(sent.id)
    }

    /// Run `call` with a bearer header, logging in again once if the token expired
    fn authorized<T>(&self, call: impl Fn(&str) -> Result<T, XrpcError>) -> Result<T, XrpcError> {
        match call(&self.bearer()) {
            Err(e) if e.error_name() == Some("ExpiredToken") => {
                let session = create_session(&self.client, &self.identifier, &self.password)?;
                *self.access_jwt.lock().unwrap_or_else(PoisonError::into_inner) = session.access_jwt;
                call(&self.bearer())
            }
            other => other,
        }
    }

    fn bearer(&self) -> String {
        let token = self.access_jwt.lock().unwrap_or_else(PoisonError::into_inner);
        format!("Bearer {}", token)
    }
}

fn create_session(
    client: &XrpcClient,
    identifier: &str,
    password: &str,
) -> Result<CreateSessionOutput, XrpcError> {
    client.procedure(
        CREATE_SESSION,
        &CreateSessionInput {
            identifier,
            password,
        },
        &[],
    )
}
