//! Core data types shared by ingestion, retrieval and the chat endpoint.

use serde::{Deserialize, Serialize};

/// A bounded window of a source document; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_title: String,
    pub source_path: String,
}

/// A row written to the vector store. The store assigns the identity.
#[derive(Debug, Clone, Serialize)]
pub struct NewRecord {
    pub title: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub source: String,
}

impl NewRecord {
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            title: chunk.source_title,
            content: chunk.text,
            embedding,
            source: chunk.source_path,
        }
    }
}

/// A stored chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub id: i64,
    #[serde(alias = "documentId")]
    pub document_id: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation sent to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role of a client-supplied history turn. `system` is not accepted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A past exchange in the browser session, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        ChatMessage {
            role,
            content: turn.content.clone(),
        }
    }
}
