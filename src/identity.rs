//! Who is confirming a recipe.
//!
//! A device fingerprint is always available; an authenticated identity may not
//! be. Confirmation waits for the latter.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

pub trait IdentityProvider: Send + Sync {
    /// The authenticated identity, if the user has signed in.
    fn current(&self) -> Option<Identity>;
    /// Stable anonymous fingerprint attached to feedback records.
    fn fingerprint(&self) -> String;
    /// Receiver that observes every sign-in and sign-out.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// Identity held in memory; sign-in can happen at any point in a session.
pub struct SharedIdentity {
    fingerprint: String,
    user: watch::Sender<Option<Identity>>,
}

impl SharedIdentity {
    pub fn anonymous(fingerprint: impl Into<String>) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            fingerprint: fingerprint.into(),
            user,
        }
    }

    pub fn signed_in(fingerprint: impl Into<String>, user_id: impl Into<String>) -> Self {
        let identity = Self::anonymous(fingerprint);
        identity.sign_in(user_id);
        identity
    }

    /// Wakes every session waiting on [`IdentityProvider::subscribe`].
    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.user.send_replace(Some(Identity {
            user_id: user_id.into(),
        }));
    }

    pub fn sign_out(&self) {
        self.user.send_replace(None);
    }
}

impl IdentityProvider for SharedIdentity {
    fn current(&self) -> Option<Identity> {
        self.user.borrow().clone()
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.user.subscribe()
    }
}

/// Fingerprint derived from the local home directory path.
pub fn device_fingerprint() -> String {
    let home = dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown-home".to_string());
    fingerprint_for(&home)
}

/// `dev-` plus the first 8 bytes of the SHA-256 of `seed`, in hex.
pub fn fingerprint_for(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("dev-{}", hex)
}
