//! Principal identity used for authorization decisions.

// std
use std::hash::{Hash, Hasher};
// self
use crate::{_prelude::*, auth::TokenPayload};

/// The principal type label brokers conventionally assign to user identities.
pub const USER_KIND: &str = "User";

/// The `(type, name)` identity the broker uses for authorization decisions.
///
/// Equality and hashing cover only the type label and name; the attached token
/// payload is carried context, never identity. A principal holding a token is
/// interchangeable with a same-name principal without one for map-key and
/// set-member purposes.
#[derive(Clone, Debug)]
pub struct Principal {
	kind: String,
	name: String,
	token: Option<Arc<TokenPayload>>,
}
impl Principal {
	/// Creates a principal with an explicit type label.
	pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
		Self { kind: kind.into(), name: name.into(), token: None }
	}

	/// Creates a `User`-typed principal.
	pub fn user(name: impl Into<String>) -> Self {
		Self::new(USER_KIND, name)
	}

	/// Attaches the session's token payload.
	pub fn with_token(mut self, token: Arc<TokenPayload>) -> Self {
		self.token = Some(token);

		self
	}

	/// Principal type label.
	pub fn kind(&self) -> &str {
		&self.kind
	}

	/// Principal name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Token payload attached at authentication time, if any.
	pub fn token(&self) -> Option<&Arc<TokenPayload>> {
		self.token.as_ref()
	}
}
impl PartialEq for Principal {
	fn eq(&self, other: &Self) -> bool {
		self.kind == other.kind && self.name == other.name
	}
}
impl Eq for Principal {}
impl Hash for Principal {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.kind.hash(state);
		self.name.hash(state);
	}
}
impl Display for Principal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.kind, self.name)
	}
}

/// Host-supplied factory that maps an authenticated session onto a principal.
///
/// Hosts whose authentication layer produced a bearer token payload pass it
/// here so authorization sees the token-carrying principal variant; all other
/// mechanisms build a bare principal from the authenticated name.
pub trait PrincipalFactory
where
	Self: Send + Sync,
{
	/// Builds the principal for an authenticated session.
	fn build(&self, name: &str, token: Option<Arc<TokenPayload>>) -> Principal;
}

/// Default [`PrincipalFactory`] producing `User`-typed principals.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPrincipalFactory;
impl PrincipalFactory for DefaultPrincipalFactory {
	fn build(&self, name: &str, token: Option<Arc<TokenPayload>>) -> Principal {
		match token {
			Some(token) => Principal::user(name).with_token(token),
			None => Principal::user(name),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn equality_ignores_attached_token() {
		let bare = Principal::user("alice");
		let token = Arc::new(TokenPayload::new("raw", "alice", 1_000));
		let carrying = Principal::user("alice").with_token(token);

		assert_eq!(bare, carrying);

		let mut set = HashMap::new();

		set.insert(bare, 1_u8);

		assert_eq!(set.get(&Principal::user("alice")), Some(&1));
	}

	#[test]
	fn names_are_case_sensitive() {
		assert_ne!(Principal::user("Alice"), Principal::user("alice"));
		assert_ne!(Principal::new("Service", "alice"), Principal::user("alice"));
	}

	#[test]
	fn default_factory_builds_token_carrying_variant() {
		let factory = DefaultPrincipalFactory;
		let token = Arc::new(TokenPayload::new("raw", "alice", 1_000));
		let principal = factory.build("alice", Some(token));

		assert_eq!(principal.kind(), USER_KIND);
		assert!(principal.token().is_some());
		assert!(factory.build("bob", None).token().is_none());
	}
}
