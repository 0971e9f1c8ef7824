mod memory;

pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use crate::models::chat::{ Conversation, Role };

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("conversation '{0}' not found")]
    NotFound(String),
}

/// Keyed transcript storage shared by every request handler.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Option<Conversation>;

    /// Inserts an empty conversation titled `first_prompt` unless one already
    /// exists for `conversation_id`. Returns the stored record either way.
    async fn create_if_absent(&self, conversation_id: &str, first_prompt: &str) -> Conversation;

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError>;

    async fn delete(&self, conversation_id: &str) -> bool;

    async fn list_all(&self) -> HashMap<String, Conversation>;
}

pub fn initialize_history_store() -> Arc<dyn HistoryStore> {
    info!("Chat history will be kept in process memory");
    Arc::new(MemoryHistoryStore::new())
}
