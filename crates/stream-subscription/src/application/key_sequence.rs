//! # Historical Key Sequencer
//!
//! Decrypts a resent run of messages that may span several key rotations.
//! Keys are tried in rotation order starting at a cursor; when the key at
//! the cursor fails, only the next key is tried, and a success there moves
//! the cursor forward for good.

use std::sync::Arc;

use shared_types::{GroupKey, StreamMessage};

use crate::domain::{SubscriptionError, UnableToDecrypt};
use crate::ports::MessageDecryptor;

/// Ordered keys plus a forward-only cursor.
pub struct DecryptionKeySequence {
    keys: Vec<GroupKey>,
    current_index: usize,
    decryptor: Arc<dyn MessageDecryptor>,
}

impl DecryptionKeySequence {
    /// `keys` must be in rotation order, oldest first.
    pub fn new(keys: Vec<GroupKey>, decryptor: Arc<dyn MessageDecryptor>) -> Self {
        Self {
            keys,
            current_index: 0,
            decryptor,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Decrypts `msg` in place with the current key, falling back to the next.
    ///
    /// # Errors
    ///
    /// `SubscriptionError::UnableToDecrypt` when neither key works or the
    /// sequence is empty. `msg` is left unchanged.
    pub fn try_decrypt_resent(&mut self, msg: &mut StreamMessage) -> Result<(), SubscriptionError> {
        let Some(current) = self.keys.get(self.current_index) else {
            return Err(UnableToDecrypt::new(msg.clone(), "no historical keys available").into());
        };
        let first_error = match self.decryptor.decrypt(msg, current) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let next_index = self.current_index + 1;
        let Some(next) = self.keys.get(next_index) else {
            return Err(UnableToDecrypt::new(msg.clone(), first_error.to_string()).into());
        };
        match self.decryptor.decrypt(msg, next) {
            Ok(()) => {
                self.current_index = next_index;
                Ok(())
            }
            Err(e) => Err(UnableToDecrypt::new(msg.clone(), e.to_string()).into()),
        }
    }
}
