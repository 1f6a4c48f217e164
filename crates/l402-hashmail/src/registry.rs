use crate::error::HashmailError;
use crate::mailbox::Mailbox;
use crate::mailbox::MailboxConfig;
use crate::mailbox::StreamId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;

struct Inner {
    mailboxes: Mutex<HashMap<StreamId, Arc<Mailbox>>>,
}

/// Tracks every live mailbox by stream id (§4.7's `NewCipherBox` /
/// `DelCipherBox` contract).
#[derive(Clone)]
pub struct MailboxRegistry {
    inner: Arc<Inner>,
}

impl MailboxRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                mailboxes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a new mailbox. Fails with `AlreadyExists` if `stream_id` is
    /// already live.
    pub fn new_cipher_box(
        &self,
        stream_id: StreamId,
        config: MailboxConfig,
    ) -> Result<Arc<Mailbox>, HashmailError> {
        let mut mailboxes = self.inner.mailboxes.lock();
        if mailboxes.contains_key(&stream_id) {
            return Err(HashmailError::AlreadyExists);
        }
        let weak_inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_stale = Arc::new(move |id: StreamId| {
            if let Some(inner) = weak_inner.upgrade() {
                inner.mailboxes.lock().remove(&id);
            }
        });
        let mailbox = Mailbox::new(stream_id, config, on_stale);
        mailboxes.insert(stream_id, mailbox.clone());
        Ok(mailbox)
    }

    /// Tears down and removes a mailbox. Fails with `NotFound` if it is not
    /// live.
    pub fn del_cipher_box(&self, stream_id: &StreamId) -> Result<(), HashmailError> {
        let mut mailboxes = self.inner.mailboxes.lock();
        mailboxes
            .remove(stream_id)
            .map(|_| ())
            .ok_or(HashmailError::NotFound)
    }

    pub fn get(&self, stream_id: &StreamId) -> Option<Arc<Mailbox>> {
        self.inner.mailboxes.lock().get(stream_id).cloned()
    }

    pub fn contains(&self, stream_id: &StreamId) -> bool {
        self.inner.mailboxes.lock().contains_key(stream_id)
    }
}

impl Default for MailboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> MailboxConfig {
        MailboxConfig {
            msg_rate: Duration::from_millis(1),
            burst: 10,
            stale_timeout: None,
        }
    }

    #[tokio::test]
    async fn duplicate_stream_id_is_rejected() {
        let registry = MailboxRegistry::new();
        let id = [1u8; 64];
        registry.new_cipher_box(id, config()).unwrap();
        assert_eq!(
            registry.new_cipher_box(id, config()).unwrap_err(),
            HashmailError::AlreadyExists
        );
    }

    #[tokio::test]
    async fn del_of_unknown_stream_fails() {
        let registry = MailboxRegistry::new();
        assert_eq!(
            registry.del_cipher_box(&[2u8; 64]).unwrap_err(),
            HashmailError::NotFound
        );
    }

    #[tokio::test]
    async fn stale_mailbox_is_removed_from_registry() {
        let registry = MailboxRegistry::new();
        let id = [3u8; 64];
        let mailbox = registry
            .new_cipher_box(
                id,
                MailboxConfig {
                    msg_rate: Duration::from_millis(1),
                    burst: 10,
                    stale_timeout: Some(Duration::from_millis(30)),
                },
            )
            .unwrap();

        let writer = mailbox.take_write().unwrap();
        let reader = mailbox.take_read().unwrap();
        drop(writer);
        drop(reader);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!registry.contains(&id));
    }
}
