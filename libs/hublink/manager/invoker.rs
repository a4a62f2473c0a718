//! Outbound hub invocations
//!
//! Every call reports success as a bool: false when there is no live
//! connection or the hub rejected the invocation. Nothing is queued
//! while disconnected.

use super::lifecycle::ConnectionManager;
use serde_json::{json, Value};
use tracing::{debug, warn};

impl ConnectionManager {
    /// Invoke `method` on the hub with positional `arguments`
    pub async fn send(&self, method: &str, arguments: Vec<Value>) -> bool {
        let connection = match self.inner.live_connection() {
            Ok(connection) => connection,
            Err(e) => {
                warn!("[HubLink] Cannot invoke '{}': {}", method, e);
                return false;
            }
        };

        match connection.invoke(method, arguments).await {
            Ok(()) => {
                debug!("[HubLink] Invoked '{}'", method);
                true
            }
            Err(e) => {
                warn!("[HubLink] Invocation of '{}' failed: {}", method, e);
                false
            }
        }
    }

    /// Send a chat message to a conversation
    pub async fn send_chat_message(&self, conversation_id: &str, content: &str) -> bool {
        let method = self.inner.methods.send_message.clone();
        self.send(&method, vec![json!(conversation_id), json!(content)])
            .await
    }

    /// Tell the conversation this user started or stopped typing
    pub async fn send_typing_indicator(&self, conversation_id: &str, is_typing: bool) -> bool {
        let method = if is_typing {
            self.inner.methods.start_typing.clone()
        } else {
            self.inner.methods.stop_typing.clone()
        };
        self.send(&method, vec![json!(conversation_id)]).await
    }

    /// Mark messages in a conversation as read
    pub async fn mark_messages_as_read(&self, conversation_id: &str, message_ids: &[String]) -> bool {
        let method = self.inner.methods.mark_read.clone();
        self.send(&method, vec![json!(conversation_id), json!(message_ids)])
            .await
    }
}
