//! Resource pattern expressions identifying sets of broker resources.
//!
//! A pattern is the comma-separated concatenation of at most one cluster
//! clause (`kafka-cluster:PAT`) and exactly one resource clause (`TYPE:PAT`).
//! A `PAT` ending in `*` matches any value starting with the remaining
//! characters; otherwise the match is exact. Policy rules carry these
//! expressions and the authorizer evaluates them against every request.

// self
use crate::{_prelude::*, error::PatternError};

const CLUSTER_CLAUSE_KEY: &str = "kafka-cluster";

/// Kinds of broker resources a pattern can identify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
	/// A named topic.
	Topic,
	/// A consumer group.
	Group,
	/// The cluster itself.
	Cluster,
	/// A transactional producer id.
	TransactionalId,
	/// A delegation token.
	DelegationToken,
}
impl ResourceKind {
	/// Returns the stable uppercase wire name used in policy comparisons.
	pub const fn as_str(self) -> &'static str {
		match self {
			ResourceKind::Topic => "TOPIC",
			ResourceKind::Group => "GROUP",
			ResourceKind::Cluster => "CLUSTER",
			ResourceKind::TransactionalId => "TRANSACTIONAL_ID",
			ResourceKind::DelegationToken => "DELEGATION_TOKEN",
		}
	}
}
impl Display for ResourceKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for ResourceKind {
	type Err = PatternError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Accepts both the compact clause spelling (`transactionalid`) and the
		// underscored wire name (`TRANSACTIONAL_ID`), case-insensitively.
		let folded: String =
			s.chars().filter(|c| *c != '_').map(|c| c.to_ascii_lowercase()).collect();

		match folded.as_str() {
			"topic" => Ok(ResourceKind::Topic),
			"group" => Ok(ResourceKind::Group),
			"cluster" => Ok(ResourceKind::Cluster),
			"transactionalid" => Ok(ResourceKind::TransactionalId),
			"delegationtoken" => Ok(ResourceKind::DelegationToken),
			_ => Err(PatternError::UnknownResourceKind { kind: s.to_owned() }),
		}
	}
}

/// Literal-or-prefix matcher derived from a single `PAT` token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct NamePattern {
	text: String,
	starts_with: bool,
}
impl NamePattern {
	fn parse(pat: &str) -> Self {
		match pat.strip_suffix('*') {
			Some(prefix) => Self { text: prefix.to_owned(), starts_with: true },
			None => Self { text: pat.to_owned(), starts_with: false },
		}
	}

	fn matches(&self, value: &str) -> bool {
		if self.starts_with { value.starts_with(&self.text) } else { value == self.text }
	}
}
impl Display for NamePattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.text)?;

		if self.starts_with {
			f.write_str("*")?;
		}

		Ok(())
	}
}

/// Parsed resource pattern, optionally qualified by a cluster-name pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePattern {
	cluster: Option<NamePattern>,
	kind: ResourceKind,
	name: NamePattern,
}
impl ResourcePattern {
	/// Parses a pattern expression.
	///
	/// Rejects duplicate cluster or resource clauses, unknown resource types,
	/// and clauses lacking the `TYPE:NAME` separator.
	pub fn parse(pattern: &str) -> Result<Self, PatternError> {
		if pattern.trim().is_empty() {
			return Err(PatternError::Empty);
		}

		let mut cluster = None;
		let mut resource = None;

		for clause in pattern.split(',') {
			let (key, pat) = clause
				.split_once(':')
				.ok_or_else(|| PatternError::MissingSeparator { clause: clause.to_owned() })?;

			if key.eq_ignore_ascii_case(CLUSTER_CLAUSE_KEY) {
				if cluster.is_some() {
					return Err(PatternError::DuplicateClusterClause);
				}

				cluster = Some(NamePattern::parse(pat));
			} else {
				if resource.is_some() {
					return Err(PatternError::DuplicateResourceClause);
				}

				resource = Some((key.parse::<ResourceKind>()?, NamePattern::parse(pat)));
			}
		}

		let (kind, name) = resource.ok_or(PatternError::MissingResourceClause)?;

		Ok(Self { cluster, kind, name })
	}

	/// Resource kind this pattern identifies.
	pub fn kind(&self) -> ResourceKind {
		self.kind
	}

	/// Whether the name clause carries trailing-`*` prefix semantics.
	pub fn starts_with(&self) -> bool {
		self.name.starts_with
	}

	/// Evaluates the pattern against a concrete resource.
	///
	/// A qualified pattern requires a cluster name and matches it first; an
	/// unqualified pattern ignores the cluster argument entirely. The kind must
	/// equal the pattern's resource kind, and the name must satisfy the
	/// exact-or-prefix clause.
	pub fn matches(&self, cluster: Option<&str>, kind: ResourceKind, name: &str) -> bool {
		if let Some(cluster_pattern) = &self.cluster {
			match cluster {
				Some(cluster) if cluster_pattern.matches(cluster) => (),
				_ => return false,
			}
		}

		kind == self.kind && self.name.matches(name)
	}
}
impl Display for ResourcePattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if let Some(cluster) = &self.cluster {
			write!(f, "{CLUSTER_CLAUSE_KEY}:{cluster},")?;
		}

		write!(f, "{}:{}", self.kind, self.name)
	}
}
impl FromStr for ResourcePattern {
	type Err = PatternError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl TryFrom<String> for ResourcePattern {
	type Error = PatternError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<ResourcePattern> for String {
	fn from(value: ResourcePattern) -> Self {
		value.to_string()
	}
}
