//! CRDT document wrapper for a single note's content. Seeded from
//! the note's current content bytes, mutated collaboratively via `yrs`,
//! and projected back to bytes on session end.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use yrs::{
    GetString, Observable, ReadTxn, StateVector, Subscription, Text, TextRef, Transact, Update,
    updates::decoder::Decode,
    updates::encoder::Encode,
};

use crate::error::{CollabError, Result};

const BODY_TEXT_NAME: &str = "body";

/// Callback invoked with the raw update bytes for every local mutation,
/// so the transport can broadcast it to peers. Never invoked for
/// updates applied via [`CrdtDocument::apply_remote_update`].
pub type LocalUpdateCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A Y.Doc wrapping a single note's `content` bytes as a Y.Text. One
/// instance exists per active collaboration session, never persisted
/// directly — only its projected snapshot is.
pub struct CrdtDocument {
    doc: yrs::Doc,
    body: TextRef,
    applying_remote: Arc<AtomicBool>,
    on_local_update: RwLock<Option<LocalUpdateCallback>>,
    _subscription: RwLock<Option<Subscription>>,
}

impl CrdtDocument {
    /// Build an empty document and seed its body text from `content`.
    /// `content` is interpreted as UTF-8; callers seeding from a binary
    /// snapshot should use [`CrdtDocument::from_snapshot`] instead.
    pub fn seeded(content: &[u8]) -> Result<Self> {
        let text = String::from_utf8(content.to_vec())
            .map_err(|e| CollabError::Crdt(format!("note content is not utf-8: {e}")))?;
        let doc = yrs::Doc::new();
        let body = doc.get_or_insert_text(BODY_TEXT_NAME);
        {
            let mut txn = doc.transact_mut();
            body.insert(&mut txn, 0, &text);
        }
        Ok(CrdtDocument {
            doc,
            body,
            applying_remote: Arc::new(AtomicBool::new(false)),
            on_local_update: RwLock::new(None),
            _subscription: RwLock::new(None),
        })
    }

    /// Rehydrate a document from a previously encoded `yrs` update
    /// (produced by [`CrdtDocument::snapshot`]). Used when re-attaching
    /// to a room id so local edits made while disconnected are not
    /// clobbered by peers.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self> {
        let doc = yrs::Doc::new();
        let body = doc.get_or_insert_text(BODY_TEXT_NAME);
        if !snapshot.is_empty() {
            let update = Update::decode_v1(snapshot)
                .map_err(|e| CollabError::Crdt(format!("bad snapshot: {e}")))?;
            let mut txn = doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| CollabError::Crdt(format!("failed to apply snapshot: {e}")))?;
        }
        Ok(CrdtDocument {
            doc,
            body,
            applying_remote: Arc::new(AtomicBool::new(false)),
            on_local_update: RwLock::new(None),
            _subscription: RwLock::new(None),
        })
    }

    /// Register the callback fired with update bytes for every local
    /// mutation. Registering twice is a no-op; the first callback wins
    /// for the lifetime of the document.
    pub fn on_local_update(&self, callback: LocalUpdateCallback) {
        if self._subscription.read().unwrap().is_some() {
            return;
        }
        *self.on_local_update.write().unwrap() = Some(callback.clone());

        let applying_remote = Arc::clone(&self.applying_remote);
        let subscription = self
            .doc
            .observe_update_v1(move |_, event| {
                if applying_remote.load(Ordering::SeqCst) {
                    return;
                }
                callback(&event.update);
            })
            .expect("observing document updates should never fail");
        *self._subscription.write().unwrap() = Some(subscription);
    }

    /// Apply an update received from a peer. Guarded so the observer
    /// registered via [`Self::on_local_update`] does not echo it back.
    pub fn apply_remote_update(&self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| CollabError::Crdt(format!("bad remote update: {e}")))?;
        self.applying_remote.store(true, Ordering::SeqCst);
        let result = {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(decoded)
        };
        self.applying_remote.store(false, Ordering::SeqCst);
        result.map_err(|e| CollabError::Crdt(format!("failed to apply remote update: {e}")))
    }

    /// Current document content as a UTF-8 string.
    pub fn text(&self) -> String {
        let txn = self.doc.transact();
        self.body.get_string(&txn)
    }

    /// Replace the document content, applying only the minimal
    /// insert/delete needed so peers see a small diff instead of a
    /// delete-all-then-insert-all, which would otherwise discard the
    /// CRDT's fine-grained operation history.
    pub fn set_text(&self, content: &str) {
        let current = self.text();
        if current == content {
            return;
        }
        let current_chars: Vec<char> = current.chars().collect();
        let new_chars: Vec<char> = content.chars().collect();

        let common_prefix = current_chars
            .iter()
            .zip(new_chars.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let remaining_current = current_chars.len() - common_prefix;
        let remaining_new = new_chars.len() - common_prefix;
        let common_suffix = current_chars[common_prefix..]
            .iter()
            .rev()
            .zip(new_chars[common_prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .take(remaining_current.min(remaining_new))
            .count();

        let delete_start = common_prefix;
        let delete_end = current_chars.len() - common_suffix;
        let insert_end = new_chars.len() - common_suffix;

        let mut txn = self.doc.transact_mut();
        if delete_end > delete_start {
            self.body
                .remove_range(&mut txn, delete_start as u32, (delete_end - delete_start) as u32);
        }
        if insert_end > common_prefix {
            let insert_text: String = new_chars[common_prefix..insert_end].iter().collect();
            self.body.insert(&mut txn, delete_start as u32, &insert_text);
        }
    }

    /// Encode the full document state, suitable for seeding a fresh
    /// peer join via [`CrdtDocument::from_snapshot`] or for persisting
    /// a crash-safety snapshot.
    pub fn snapshot(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the diff a peer needs given its state vector, for the
    /// initial handshake after a join.
    pub fn diff_for(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| CollabError::Crdt(format!("bad state vector: {e}")))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Project the document back to the bytes that should be written
    /// through `gnote_core::note_core::NoteStateCore::update_note` on
    /// session end.
    pub fn project_to_content(&self) -> Vec<u8> {
        self.text().into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_document_round_trips_through_snapshot() {
        let doc = CrdtDocument::seeded(b"hello").unwrap();
        assert_eq!(doc.text(), "hello");
        let snap = doc.snapshot();
        let restored = CrdtDocument::from_snapshot(&snap).unwrap();
        assert_eq!(restored.text(), "hello");
    }

    #[test]
    fn set_text_applies_minimal_diff() {
        let doc = CrdtDocument::seeded(b"hello world").unwrap();
        doc.set_text("hello brave world");
        assert_eq!(doc.text(), "hello brave world");
    }

    #[test]
    fn two_documents_converge_after_exchanging_updates() {
        let host = CrdtDocument::seeded(b"X").unwrap();
        let guest = CrdtDocument::from_snapshot(&host.snapshot()).unwrap();

        {
            let mut txn = host.doc.transact_mut();
            host.body.push(&mut txn, "Y");
        }
        {
            let mut txn = guest.doc.transact_mut();
            guest.body.push(&mut txn, "Z");
        }

        let host_update = host.snapshot();
        let guest_update = guest.snapshot();
        host.apply_remote_update(&guest_update).unwrap();
        guest.apply_remote_update(&host_update).unwrap();

        assert_eq!(host.text(), guest.text());
        assert!(host.text().contains('Y'));
        assert!(host.text().contains('Z'));
    }

    #[test]
    fn local_update_observer_does_not_fire_for_remote_updates() {
        let host = CrdtDocument::seeded(b"X").unwrap();
        let guest = CrdtDocument::seeded(b"").unwrap();

        let seen: Arc<std::sync::Mutex<Vec<Vec<u8>>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        guest.on_local_update(Arc::new(move |update| {
            seen_clone.lock().unwrap().push(update.to_vec());
        }));

        guest.apply_remote_update(&host.snapshot()).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        {
            let mut txn = guest.doc.transact_mut();
            guest.body.push(&mut txn, "!");
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
