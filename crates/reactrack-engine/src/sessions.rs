//! Per-sender sessions and cached profiles.
//!
//! A bounded LRU keyed by sender id. Each entry holds the sender's session
//! (created once, never mutated) and the state of its profile lookup. The
//! lock is only held for map operations; lookups run on spawned tasks.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reactrack_core::errors::IdentityError;
use reactrack_core::identity::{IdentityProvider, Profile, SubscriberDirectory};
use reactrack_core::ids::{SenderId, SessionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub sender_id: SenderId,
    pub session_id: SessionId,
}

#[derive(Clone, Debug)]
enum ProfileState {
    Unknown,
    Pending,
    Ready(Profile),
}

struct CachedSender {
    session: Session,
    profile: ProfileState,
}

pub struct IdentityCache {
    entries: Mutex<IndexMap<SenderId, CachedSender>>,
    capacity: usize,
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn SubscriberDirectory>,
}

impl IdentityCache {
    pub fn new(
        capacity: usize,
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn SubscriberDirectory>,
    ) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            provider,
            directory,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Session for `sender`, created on first sight.
    pub fn resolve(&self, sender: &SenderId) -> Session {
        let mut entries = self.entries.lock();
        self.touch(&mut entries, sender).session.clone()
    }

    /// Cached profile, if one has been resolved.
    pub fn profile(&self, sender: &SenderId) -> Option<Profile> {
        match self.entries.lock().get(sender).map(|e| &e.profile) {
            Some(ProfileState::Ready(profile)) => Some(profile.clone()),
            _ => None,
        }
    }

    /// Start a profile lookup for `sender` unless one is cached or already
    /// running. The caller may await the handle or drop it.
    ///
    /// On success the profile is cached and the sender is registered with
    /// the subscriber directory. On failure nothing is cached, so the next
    /// turn tries again.
    pub fn resolve_profile(
        self: &Arc<Self>,
        sender: &SenderId,
    ) -> Option<JoinHandle<Result<Profile, IdentityError>>> {
        {
            let mut entries = self.entries.lock();
            let entry = self.touch(&mut entries, sender);
            match entry.profile {
                ProfileState::Ready(_) | ProfileState::Pending => return None,
                ProfileState::Unknown => entry.profile = ProfileState::Pending,
            }
        }

        let cache = Arc::clone(self);
        let sender = sender.clone();
        Some(tokio::spawn(async move {
            match cache.provider.lookup(&sender).await {
                Ok(profile) => {
                    cache.set_profile(&sender, ProfileState::Ready(profile.clone()));
                    match cache.directory.register(&sender, &profile).await {
                        Ok(true) => info!(sender_id = %sender, "new subscriber registered"),
                        Ok(false) => debug!(sender_id = %sender, "subscriber already known"),
                        Err(e) => warn!(sender_id = %sender, error = %e, "failed to register subscriber"),
                    }
                    Ok(profile)
                }
                Err(e) => {
                    warn!(sender_id = %sender, error = %e, "profile lookup failed");
                    cache.set_profile(&sender, ProfileState::Unknown);
                    Err(e)
                }
            }
        }))
    }

    fn set_profile(&self, sender: &SenderId, state: ProfileState) {
        // The entry may have been evicted while the lookup ran.
        if let Some(entry) = self.entries.lock().get_mut(sender) {
            entry.profile = state;
        }
    }

    /// Fetch or insert the entry for `sender` and mark it most recently used.
    fn touch<'a>(
        &self,
        entries: &'a mut IndexMap<SenderId, CachedSender>,
        sender: &SenderId,
    ) -> &'a mut CachedSender {
        let last = entries.len();
        let index = match entries.get_index_of(sender) {
            Some(index) => {
                entries.move_index(index, last - 1);
                last - 1
            }
            None => {
                if entries.len() >= self.capacity {
                    if let Some((evicted, _)) = entries.shift_remove_index(0) {
                        debug!(sender_id = %evicted, "evicting least recently used session");
                    }
                }
                let session = Session {
                    sender_id: sender.clone(),
                    session_id: SessionId::new(),
                };
                debug!(sender_id = %sender, session_id = %session.session_id, "session created");
                entries.insert(
                    sender.clone(),
                    CachedSender {
                        session,
                        profile: ProfileState::Unknown,
                    },
                );
                entries.len() - 1
            }
        };
        &mut entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reactrack_messenger::mock::MockIdentity;
    use reactrack_store::{Database, SubscriberRepo};

    fn cache_with(capacity: usize, identity: MockIdentity) -> (Arc<IdentityCache>, SubscriberRepo) {
        let repo = SubscriberRepo::new(Database::in_memory().unwrap());
        let cache = Arc::new(IdentityCache::new(
            capacity,
            Arc::new(identity),
            Arc::new(repo.clone()),
        ));
        (cache, repo)
    }

    #[test]
    fn resolve_is_idempotent_per_sender() {
        let (cache, _) = cache_with(10, MockIdentity::new());
        let a1 = cache.resolve(&SenderId::new("a"));
        let a2 = cache.resolve(&SenderId::new("a"));
        let b = cache.resolve(&SenderId::new("b"));

        assert_eq!(a1, a2);
        assert_ne!(a1.session_id, b.session_id);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn least_recently_used_sender_is_evicted() {
        let (cache, _) = cache_with(2, MockIdentity::new());
        let a = cache.resolve(&SenderId::new("a"));
        cache.resolve(&SenderId::new("b"));
        // Touch "a" so "b" becomes the oldest.
        cache.resolve(&SenderId::new("a"));
        cache.resolve(&SenderId::new("c"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.resolve(&SenderId::new("a")), a);
        let entries = cache.entries.lock();
        assert!(!entries.contains_key(&SenderId::new("b")));
    }

    #[tokio::test]
    async fn profile_resolves_once_and_registers_subscriber() {
        let (cache, repo) = cache_with(10, MockIdentity::new().with_profile("42", "Ada"));
        let sender = SenderId::new("42");

        let handle = cache.resolve_profile(&sender).unwrap();
        let profile = handle.await.unwrap().unwrap();
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(cache.profile(&sender).unwrap().first_name, "Ada");
        assert_eq!(repo.get(&sender).unwrap().profile.first_name, "Ada");

        assert!(cache.resolve_profile(&sender).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_resolution_issues_one_lookup() {
        let identity = MockIdentity::with_delay(Duration::from_secs(1)).with_profile("42", "Ada");
        let repo = SubscriberRepo::new(Database::in_memory().unwrap());
        let identity = Arc::new(identity);
        let cache = Arc::new(IdentityCache::new(10, identity.clone(), Arc::new(repo)));
        let sender = SenderId::new("42");

        let first = cache.resolve_profile(&sender);
        let second = cache.resolve_profile(&sender);
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(cache.profile(&sender).is_none());

        first.unwrap().await.unwrap().unwrap();
        assert_eq!(identity.calls(), 1);
        assert!(cache.profile(&sender).is_some());
    }

    #[tokio::test]
    async fn failed_lookup_is_not_cached() {
        let identity = Arc::new(MockIdentity::new());
        let repo = SubscriberRepo::new(Database::in_memory().unwrap());
        let cache = Arc::new(IdentityCache::new(10, identity.clone(), Arc::new(repo.clone())));
        let sender = SenderId::new("ghost");

        let err = cache.resolve_profile(&sender).unwrap().await.unwrap();
        assert!(matches!(err, Err(IdentityError::MissingProfile(_))));
        assert!(cache.profile(&sender).is_none());
        assert!(repo.get(&sender).is_err());

        // Next turn retries.
        assert!(cache.resolve_profile(&sender).is_some());
        assert_eq!(cache.resolve(&sender).sender_id, sender);
    }
}
