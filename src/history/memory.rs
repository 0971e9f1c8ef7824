use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation, Role };

#[derive(Default)]
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.read().await.get(conversation_id).cloned()
    }

    async fn create_if_absent(&self, conversation_id: &str, first_prompt: &str) -> Conversation {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!("Creating conversation {}", conversation_id);
                Conversation::new(conversation_id, first_prompt)
            })
            .clone()
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| HistoryError::NotFound(conversation_id.to_string()))?;
        conversation.messages.push(ChatMessage::new(role, content));
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> bool {
        self.conversations.write().await.remove(conversation_id).is_some()
    }

    async fn list_all(&self) -> HashMap<String, Conversation> {
        self.conversations.read().await.clone()
    }
}
