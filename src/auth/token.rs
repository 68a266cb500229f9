//! Bearer token payload threaded through one authenticated broker session.

// std
use std::any::Any;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
// self
use crate::_prelude::*;

/// Redacted token wrapper keeping raw bearer material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Envelope the broker threads through one authenticated session.
///
/// Carries the opaque raw token, the principal it authenticates, the absolute
/// expiry instant, optionally the parsed JWT claims, and a typed attachment
/// slot the host uses to pin per-session auxiliary data. The payload handle
/// itself is the only per-session identity; two sessions authenticated with
/// the same raw token still hold distinct envelopes.
pub struct TokenPayload {
	raw: TokenSecret,
	principal_name: String,
	expires_at_ms: i64,
	claims: Option<Value>,
	slot: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
}
impl TokenPayload {
	/// Creates an envelope for a validated bearer token.
	pub fn new(raw: impl Into<String>, principal_name: impl Into<String>, expires_at_ms: i64) -> Self {
		Self {
			raw: TokenSecret::new(raw),
			principal_name: principal_name.into(),
			expires_at_ms,
			claims: None,
			slot: RwLock::new(None),
		}
	}

	/// Attaches the parsed JWT claims document.
	pub fn with_claims(mut self, claims: Value) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Raw token string; callers must avoid logging it.
	pub fn raw(&self) -> &str {
		self.raw.expose()
	}

	/// Principal name this token authenticates.
	pub fn principal_name(&self) -> &str {
		&self.principal_name
	}

	/// Absolute expiry instant in milliseconds since the Unix epoch.
	pub fn expires_at_ms(&self) -> i64 {
		self.expires_at_ms
	}

	/// Parsed JWT claims, when the host supplied them.
	pub fn claims(&self) -> Option<&Value> {
		self.claims.as_ref()
	}

	/// Reads the session attachment, downcast to the caller's type.
	pub fn payload<T>(&self) -> Option<Arc<T>>
	where
		T: 'static + Send + Sync,
	{
		self.slot.read().clone().and_then(|value| value.downcast::<T>().ok())
	}

	/// Replaces the session attachment.
	///
	/// Single-writer under the cache's locking discipline; concurrent readers
	/// observe either the previous or the new attachment.
	pub fn set_payload(&self, value: Arc<dyn Any + Send + Sync>) {
		*self.slot.write() = Some(value);
	}
}
impl Debug for TokenPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPayload")
			.field("raw", &self.raw)
			.field("principal_name", &self.principal_name)
			.field("expires_at_ms", &self.expires_at_ms)
			.field("claims", &self.claims.as_ref().map(|_| ".."))
			.finish()
	}
}

/// Decodes the claims set from a compact JWT without verifying its signature.
///
/// Signature and claims validation happen upstream of this crate; the helper
/// only recovers the payload segment so hosts can populate
/// [`TokenPayload::with_claims`] and run filter queries against it. Returns
/// `None` when the string is not a three-segment compact JWT or the payload is
/// not base64url-encoded JSON.
pub fn decode_claims(raw: &str) -> Option<Value> {
	let mut segments = raw.split('.');
	let _header = segments.next()?;
	let payload = segments.next()?;

	if segments.next().is_none() || raw.split('.').count() != 3 {
		return None;
	}

	let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;

	serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn compact_jwt(claims: &Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.sig")
	}

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn payload_slot_round_trips_typed_attachments() {
		let token = TokenPayload::new("raw-token", "alice", 1_000);

		assert!(token.payload::<String>().is_none());

		token.set_payload(Arc::new("pinned".to_string()));

		assert_eq!(token.payload::<String>().as_deref(), Some(&"pinned".to_string()));
		assert!(token.payload::<u64>().is_none(), "Mismatched downcast should yield None.");
	}

	#[test]
	fn decode_claims_recovers_payload_segment() {
		let claims = serde_json::json!({"iss": "http://host/", "sub": "alice"});
		let jwt = compact_jwt(&claims);

		assert_eq!(decode_claims(&jwt), Some(claims));
	}

	#[test]
	fn decode_claims_rejects_non_jwt_material() {
		assert_eq!(decode_claims("opaque-token"), None);
		assert_eq!(decode_claims("a.b"), None);
		assert_eq!(decode_claims("a.!!!.c"), None);
	}

	#[test]
	fn debug_never_prints_raw_token() {
		let token = TokenPayload::new("raw-token", "alice", 1_000);
		let rendered = format!("{token:?}");

		assert!(!rendered.contains("raw-token"));
		assert!(rendered.contains("alice"));
	}
}
