use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::IdentityError;
use crate::ids::SenderId;

/// Display attributes of a sender, as reported by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timezone: Option<f64>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Resolves a sender id to profile attributes via a network lookup.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn lookup(&self, sender: &SenderId) -> Result<Profile, IdentityError>;
}

/// Durable record of senders whose profile has been resolved.
///
/// `register` must tolerate being called twice for the same sender; the
/// second call is a no-op that returns `Ok(false)`.
#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn register(&self, sender: &SenderId, profile: &Profile) -> Result<bool, IdentityError>;
}

