//! Crate-level error types shared across the cache, filter engine, and matchers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// JSONPath filter query parse failure.
	#[error(transparent)]
	Query(#[from] QueryError),
	/// Resource pattern parse failure.
	#[error(transparent)]
	Pattern(#[from] PatternError),
	/// Upstream grants fetch failure.
	#[error(transparent)]
	Fetch(#[from] FetchError),
	/// Failure propagated through the single-flight barrier.
	#[error(transparent)]
	Service(#[from] ServiceError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Parse failures raised by [`JsonPathFilterQuery::parse`](crate::query::JsonPathFilterQuery::parse).
///
/// Every variant carries the byte offset into the query string where parsing
/// stopped, so callers can point at the offending character when rejecting a
/// filter during configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum QueryError {
	/// The query string was empty or contained only whitespace.
	#[error("Query cannot be empty.")]
	Empty,
	/// The query did not start with a recognized form (`@.*`, `$[?(`, or `[?(`).
	#[error("Query must start with `@.*`, `$[?(`, or `[?(`: found {found}.")]
	UnrecognizedForm {
		/// Leading fragment that failed to match any accepted form.
		found: String,
	},
	/// An unexpected character was encountered while tokenizing.
	#[error("Unexpected character {found:?} at offset {position}.")]
	UnexpectedCharacter {
		/// Byte offset of the offending character.
		position: usize,
		/// The character that could not be tokenized.
		found: char,
	},
	/// A token violated the grammar at this point.
	#[error("Expected {expected} at offset {position}, found {found}.")]
	UnexpectedToken {
		/// Byte offset of the offending token.
		position: usize,
		/// Description of what the grammar required.
		expected: &'static str,
		/// Rendering of the token that was found instead.
		found: String,
	},
	/// The query ended before the grammar was satisfied.
	#[error("Query ended unexpectedly; expected {expected}.")]
	UnexpectedEnd {
		/// Description of what the grammar still required.
		expected: &'static str,
	},
	/// A string literal was never closed.
	#[error("Unterminated string literal starting at offset {position}.")]
	UnterminatedString {
		/// Byte offset of the opening quote.
		position: usize,
	},
	/// A numeric literal could not be parsed as a decimal.
	#[error("Invalid number literal {literal} at offset {position}.")]
	InvalidNumber {
		/// Byte offset of the literal.
		position: usize,
		/// The literal text that failed to parse.
		literal: String,
	},
	/// The operator is reserved by the grammar but not supported by this engine.
	#[error("Operator {op} at offset {position} is not supported.")]
	UnsupportedOperator {
		/// Byte offset of the operator.
		position: usize,
		/// The reserved operator text.
		op: &'static str,
	},
	/// Input remained after the query grammar was satisfied.
	#[error("Unexpected trailing input at offset {position}.")]
	TrailingInput {
		/// Byte offset where the trailing input begins.
		position: usize,
	},
}

/// Parse failures raised by [`ResourcePattern::parse`](crate::pattern::ResourcePattern::parse).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum PatternError {
	/// The pattern string was empty.
	#[error("Resource pattern cannot be empty.")]
	Empty,
	/// More than one `kafka-cluster:` clause was present.
	#[error("Resource pattern contains more than one cluster clause.")]
	DuplicateClusterClause,
	/// More than one resource clause was present.
	#[error("Resource pattern contains more than one resource clause.")]
	DuplicateResourceClause,
	/// No resource clause was present.
	#[error("Resource pattern is missing a resource clause.")]
	MissingResourceClause,
	/// A clause was missing its `TYPE:NAME` separator.
	#[error("Clause {clause} is missing the `:` separator.")]
	MissingSeparator {
		/// The clause text that lacked a separator.
		clause: String,
	},
	/// The resource type token did not name a known resource kind.
	#[error("Unknown resource type {kind}.")]
	UnknownResourceKind {
		/// The unrecognized type token.
		kind: String,
	},
}

/// Upstream grants-provider failures surfaced by [`GrantsFetcher`](crate::fetch::GrantsFetcher)
/// implementations.
#[derive(Debug, ThisError)]
pub enum FetchError {
	/// The grants endpoint answered with a non-success HTTP status.
	#[error("Grants endpoint returned HTTP {status}: {message}.")]
	Http {
		/// HTTP status code from the grants endpoint.
		status: u16,
		/// Response body or reason phrase summarizing the failure.
		message: String,
	},
	/// Transport failure (DNS, TCP, TLS) before any HTTP status was observed.
	#[error("Network error occurred while calling the grants endpoint.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The grants endpoint responded with a body that could not be decoded as JSON.
	#[error("Grants endpoint returned a malformed JSON document.")]
	Malformed {
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl FetchError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}

	/// Returns the HTTP status carried by this failure, if any was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http { status, .. } => Some(*status),
			Self::Transport { .. } => None,
			Self::Malformed { status, .. } => *status,
		}
	}

	/// Whether the retry policy may attempt this call again.
	///
	/// Connection errors and unexpected statuses are retriable; 401 (invalid
	/// token) and 403 (no permissions) are terminal answers from the provider.
	pub fn is_retriable(&self) -> bool {
		!matches!(self.status(), Some(401) | Some(403))
	}
}

/// Shared outcome errors produced by the single-flight barrier.
///
/// Values are [`Clone`] so that every waiter parked on the same flight observes
/// the identical outcome; the original cause is preserved behind an [`Arc`].
#[derive(Clone, Debug, ThisError)]
pub enum ServiceError {
	/// The winning fetch failed; all waiters share the original cause.
	#[error("Grants service call failed.")]
	Upstream(#[source] Arc<Error>),
	/// The flight was abandoned before producing an outcome.
	#[error("Grants service call was interrupted.")]
	Interrupted,
	/// The cache has been closed and accepts no further fetches.
	#[error("Grants cache is closed.")]
	Closed,
}
impl ServiceError {
	/// Wraps an error for propagation to every waiter on a flight.
	///
	/// Service-related causes pass through untouched so waiters never observe a
	/// double-wrapped chain.
	pub fn upstream(error: Error) -> Self {
		match error {
			Error::Service(service) => service,
			other => Self::Upstream(Arc::new(other)),
		}
	}

	/// HTTP status of the underlying fetch failure, when one was observed.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Self::Upstream(cause) => match cause.as_ref() {
				Error::Fetch(fetch) => fetch.status(),
				_ => None,
			},
			Self::Interrupted | Self::Closed => None,
		}
	}
}

/// Configuration validation failures raised by
/// [`AuthzConfigBuilder::build`](crate::config::AuthzConfigBuilder::build).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ConfigError {
	/// The refresh worker pool must hold at least one worker.
	#[error("Grants refresh pool size must be at least 1.")]
	ZeroRefreshPoolSize,
	/// The idle threshold must be positive.
	#[error("Grants max idle time must be positive.")]
	ZeroMaxIdleTime,
	/// The GC cadence must be positive.
	#[error("GC period must be positive.")]
	ZeroGcPeriod,
}
