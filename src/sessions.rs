//! Session registry contract supplied by the host broker.

// self
use crate::{_prelude::*, auth::TokenPayload};

/// Host-owned registry enumerating live authenticated sessions.
///
/// The cache consults the registry from its background loops only; it never
/// mutates sessions outside [`remove_all_with_matching_access_token`](Self::remove_all_with_matching_access_token).
pub trait SessionRegistry
where
	Self: Send + Sync,
{
	/// Snapshot of the token payloads for live sessions, one element per
	/// session. The snapshot is stable for the duration of one background pass.
	fn list_live(&self) -> Vec<Arc<TokenPayload>>;

	/// Evicts every session whose raw token string equals `raw`.
	fn remove_all_with_matching_access_token(&self, raw: &str);
}

/// Thread-safe in-memory [`SessionRegistry`] for embedders and tests.
#[derive(Default)]
pub struct MemorySessions(RwLock<Vec<Arc<TokenPayload>>>);
impl MemorySessions {
	/// Registers a newly authenticated session.
	pub fn open(&self, token: Arc<TokenPayload>) {
		self.0.write().push(token);
	}

	/// Drops one session identified by its payload handle.
	pub fn close(&self, token: &Arc<TokenPayload>) {
		self.0.write().retain(|live| !Arc::ptr_eq(live, token));
	}

	/// Number of live sessions.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Whether no sessions are live.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl SessionRegistry for MemorySessions {
	fn list_live(&self) -> Vec<Arc<TokenPayload>> {
		self.0.read().clone()
	}

	fn remove_all_with_matching_access_token(&self, raw: &str) {
		self.0.write().retain(|live| live.raw() != raw);
	}
}
impl Debug for MemorySessions {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemorySessions").field("live", &self.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn snapshot_lists_one_element_per_session() {
		let sessions = MemorySessions::default();
		let token = Arc::new(TokenPayload::new("T1", "alice", 1_000));

		sessions.open(token.clone());
		sessions.open(token.clone());

		assert_eq!(sessions.list_live().len(), 2);

		sessions.close(&token);
		sessions.close(&token);

		assert!(sessions.is_empty());
	}

	#[test]
	fn removal_matches_on_raw_token_across_principals() {
		let sessions = MemorySessions::default();

		sessions.open(Arc::new(TokenPayload::new("T1", "alice", 1_000)));
		sessions.open(Arc::new(TokenPayload::new("T1", "bob", 1_000)));
		sessions.open(Arc::new(TokenPayload::new("T2", "carol", 1_000)));
		sessions.remove_all_with_matching_access_token("T1");

		let live = sessions.list_live();

		assert_eq!(live.len(), 1);
		assert_eq!(live[0].principal_name(), "carol");
	}
}
