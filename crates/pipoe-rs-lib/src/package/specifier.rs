use super::PackageVersion;

/// Comparison operators allowed in a version specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
	/// `==`, may carry a trailing `.*` wildcard.
	Equal,
	/// `!=`, may carry a trailing `.*` wildcard.
	NotEqual,
	GreaterEqual,
	LessEqual,
	Greater,
	Less,
	/// `~=`, at least this version and within the same release prefix.
	Compatible,
	/// `===`, string identity.
	Arbitrary,
}

impl Operator {
	fn as_str(&self) -> &'static str {
		match self {
			Operator::Equal => "==",
			Operator::NotEqual => "!=",
			Operator::GreaterEqual => ">=",
			Operator::LessEqual => "<=",
			Operator::Greater => ">",
			Operator::Less => "<",
			Operator::Compatible => "~=",
			Operator::Arbitrary => "===",
		}
	}
}

/// A single `<op><version>` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparator {
	pub op: Operator,
	pub version: PackageVersion,
	/// The clause ended in `.*`
	pub wildcard: bool,
}

impl Comparator {
	pub fn new(op: Operator, version: PackageVersion) -> Self {
		Self { op, version, wildcard: false }
	}

	pub fn is_version_within(&self, other: &PackageVersion) -> bool {
		match self.op {
			Operator::Equal if self.wildcard => prefix_matches(&self.version, other),
			Operator::NotEqual if self.wildcard => !prefix_matches(&self.version, other),
			Operator::Equal => other == &self.version,
			Operator::NotEqual => other != &self.version,
			Operator::GreaterEqual => other >= &self.version,
			Operator::LessEqual => other <= &self.version,
			Operator::Greater => other > &self.version,
			Operator::Less => other < &self.version,
			Operator::Compatible => {
				let release = self.version.release();
				let prefix = &release[..release.len().saturating_sub(1).max(1).min(release.len())];
				other >= &self.version && release_starts_with(other, self.version.epoch(), prefix)
			},
			Operator::Arbitrary => other.to_string() == self.version.to_string(),
		}
	}

	fn parse(s: &str) -> crate::Result<Self> {
		let s = s.trim();
		/* Longest operators first so `===` isn't read as `==` */
		let ops = [
			("===", Operator::Arbitrary),
			("~=", Operator::Compatible),
			("==", Operator::Equal),
			("!=", Operator::NotEqual),
			(">=", Operator::GreaterEqual),
			("<=", Operator::LessEqual),
			(">", Operator::Greater),
			("<", Operator::Less),
		];

		let (op, rest) = ops.iter()
			.find_map(|(text, op)| s.strip_prefix(text).map(|rest| (*op, rest.trim())))
			/* A bare version is treated as a pin, requirement files written by hand do this */
			.unwrap_or((Operator::Equal, s));

		let (rest, wildcard) = match rest.strip_suffix(".*") {
			Some(r) if matches!(op, Operator::Equal | Operator::NotEqual) => (r, true),
			Some(_) => return Err(crate::Error::Parse(format!("wildcard not allowed with {} in \"{}\"", op.as_str(), s))),
			None => (rest, false),
		};

		Ok(Comparator { op, version: PackageVersion::new(rest)?, wildcard })
	}
}

fn release_starts_with(version: &PackageVersion, epoch: u64, prefix: &[u64]) -> bool {
	if version.epoch() != epoch {
		return false;
	}
	let release = version.release();
	prefix.iter().enumerate().all(|(i, p)| release.get(i).copied().unwrap_or(0) == *p)
}

fn prefix_matches(prefix: &PackageVersion, version: &PackageVersion) -> bool {
	release_starts_with(version, prefix.epoch(), &prefix.release())
}

impl std::fmt::Display for Comparator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}{}{}", self.op.as_str(), self.version, if self.wildcard { ".*" } else { "" })
	}
}

/// A set of comparators that must all hold. No comparators means any version.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct VersionConstraint {
	comparators: Vec<Comparator>,
}

impl VersionConstraint {
	pub fn any() -> Self {
		Self::default()
	}

	/// Requires exactly `version`.
	pub fn exact(version: PackageVersion) -> Self {
		Self { comparators: vec![Comparator::new(Operator::Equal, version)] }
	}

	/// Parses a comma separated specifier list such as `>=1.21.1, <1.25` or `(==2.*)`.
	pub fn parse(s: &str) -> crate::Result<Self> {
		let s = s.trim();
		let s = s.strip_prefix('(').and_then(|s| s.strip_suffix(')')).unwrap_or(s);

		let comparators = s.split(',')
			.map(str::trim)
			.filter(|c| !c.is_empty())
			.map(Comparator::parse)
			.collect::<crate::Result<Vec<_>>>()?;

		Ok(Self { comparators })
	}

	pub fn is_any(&self) -> bool {
		self.comparators.is_empty()
	}

	pub fn comparators(&self) -> &[Comparator] {
		&self.comparators
	}

	pub fn is_version_within(&self, version: &PackageVersion) -> bool {
		self.comparators.iter().all(|c| c.is_version_within(version))
	}

	/// The version pinned by an exact `==` clause.
	pub fn pinned(&self) -> Option<&PackageVersion> {
		self.comparators.iter()
			.find(|c| matches!(c.op, Operator::Equal | Operator::Arbitrary) && !c.wildcard)
			.map(|c| &c.version)
	}

	/// The smallest version the constraint could accept, if it has a floor at all.
	pub fn lower_bound(&self) -> Option<&PackageVersion> {
		self.comparators.iter()
			.filter(|c| matches!(c.op, Operator::Equal | Operator::Arbitrary | Operator::GreaterEqual | Operator::Greater | Operator::Compatible))
			.map(|c| &c.version)
			.max()
	}

	/// Picks the highest version within the constraint.
	///
	/// Pre-releases are only chosen when no final release fits or the constraint pins one.
	pub fn max_satisfying<'a>(&self, versions: impl IntoIterator<Item = &'a PackageVersion>) -> Option<&'a PackageVersion> {
		let allow_pre = self.comparators.iter().any(|c| c.version.is_prerelease());
		let matching: Vec<&PackageVersion> = versions.into_iter().filter(|v| self.is_version_within(v)).collect();

		let stable = matching.iter().copied().filter(|v| allow_pre || !v.is_prerelease()).max();
		stable.or_else(|| matching.into_iter().max())
	}
}

impl From<PackageVersion> for VersionConstraint {
	fn from(value: PackageVersion) -> Self {
		VersionConstraint::exact(value)
	}
}

impl std::fmt::Display for VersionConstraint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.comparators.is_empty() {
			return write!(f, "*");
		}
		let parts: Vec<String> = self.comparators.iter().map(|c| c.to_string()).collect();
		write!(f, "{}", parts.join(","))
	}
}
