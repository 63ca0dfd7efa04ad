/// A registry release version.
///
/// Ordering follows the usual PyPI conventions closely enough for picking the newest release:
/// an optional `N!` epoch, numeric segments compared as numbers, pre-release tags
/// (`dev`, `a`, `b`, `rc`) sorting before the release they precede and `post` after it.
/// Trailing zero segments are insignificant so `1.0 == 1.0.0`.
#[derive(Debug, Clone)]
pub struct PackageVersion {
	epoch: u64,
	raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Segment<'a> {
	Number(u64),
	Text(&'a str),
}

/// Sort rank of a textual segment relative to the end of a version, which ranks as `RELEASE_RANK`.
fn text_rank(s: &str) -> u8 {
	match s.to_ascii_lowercase().as_str() {
		"dev" => 0,
		"a" | "alpha" => 1,
		"b" | "beta" => 2,
		"c" | "rc" | "pre" | "preview" => 3,
		"post" | "rev" | "r" => 5,
		_ => 4,
	}
}

const RELEASE_RANK: u8 = 4;

impl PackageVersion {
	pub fn new(version: &str) -> crate::Result<Self> {
		let version = version.trim();
		let version = version.strip_prefix(['v', 'V']).unwrap_or(version);
		if version.is_empty() {
			return Err(crate::Error::Parse("empty version string".to_string()));
		}
		if version.chars().any(|c| c.is_whitespace() || c == ',') {
			return Err(crate::Error::Parse(format!("invalid version string \"{}\"", version)));
		}

		let (epoch, raw) = match version.split_once('!') {
			Some((e, rest)) => (
				e.parse::<u64>().map_err(|_| crate::Error::Parse(format!("invalid epoch in \"{}\"", version)))?,
				rest,
			),
			None => (0, version),
		};

		if !raw.chars().next().map_or(false, |c| c.is_ascii_alphanumeric()) {
			return Err(crate::Error::Parse(format!("invalid version string \"{}\"", version)));
		}

		Ok(PackageVersion { epoch, raw: raw.to_string() })
	}

	fn segments(&self) -> Vec<Segment<'_>> {
		let mut out = Vec::<Segment>::new();
		let s = self.raw.as_str();
		let mut start: Option<(usize, bool)> = None;

		for (i, c) in s.char_indices() {
			let kind = if c.is_ascii_digit() {
				Some(true)
			} else if c.is_alphabetic() {
				Some(false)
			} else {
				None
			};

			match (start, kind) {
				(Some((_, numeric)), Some(k)) if numeric == k => {},
				(Some((begin, numeric)), _) => {
					out.push(make_segment(&s[begin..i], numeric));
					start = kind.map(|k| (i, k));
				},
				(None, Some(k)) => start = Some((i, k)),
				(None, None) => {},
			}
		}
		if let Some((begin, numeric)) = start {
			out.push(make_segment(&s[begin..], numeric));
		}
		out
	}

	/// The leading numeric segments, `1.2.3rc1` gives `[1, 2, 3]`.
	pub fn release(&self) -> Vec<u64> {
		self.raw
			.split(|c: char| !c.is_ascii_digit())
			.take_while(|s| !s.is_empty())
			.map(|s| s.parse::<u64>().unwrap_or(u64::MAX))
			.collect()
	}

	pub fn epoch(&self) -> u64 {
		self.epoch
	}

	/// Is this a development or pre-release version.
	pub fn is_prerelease(&self) -> bool {
		self.segments().iter().any(|s| matches!(s, Segment::Text(t) if text_rank(t) < RELEASE_RANK))
	}

	pub fn as_str(&self) -> &str {
		&self.raw
	}
}

fn make_segment(s: &str, numeric: bool) -> Segment<'_> {
	if numeric {
		Segment::Number(s.parse::<u64>().unwrap_or(u64::MAX))
	} else {
		Segment::Text(s)
	}
}

impl Default for PackageVersion {
	fn default() -> Self {
		PackageVersion { epoch: 0, raw: "0".to_string() }
	}
}

impl TryFrom<String> for PackageVersion {
	type Error = crate::Error;
	fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(&value) }
}

impl TryFrom<&str> for PackageVersion {
	type Error = crate::Error;
	fn try_from(value: &str) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PackageVersion> for String {
	fn from(value: PackageVersion) -> Self {
		value.to_string()
	}
}

impl PartialEq for PackageVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == std::cmp::Ordering::Equal
	}
}

impl Eq for PackageVersion {}

impl Ord for PackageVersion {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		use std::cmp::Ordering;

		match self.epoch.cmp(&other.epoch) {
			Ordering::Equal => {},
			ord => return ord,
		}

		let lhs = self.segments();
		let rhs = other.segments();

		for i in 0..std::cmp::max(lhs.len(), rhs.len()) {
			let ord = match (lhs.get(i), rhs.get(i)) {
				(Some(Segment::Number(a)), Some(Segment::Number(b))) => a.cmp(b),
				(Some(Segment::Text(a)), Some(Segment::Text(b))) => {
					text_rank(a).cmp(&text_rank(b)).then_with(|| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
				},
				(Some(Segment::Number(_)), Some(Segment::Text(_))) => Ordering::Greater,
				(Some(Segment::Text(_)), Some(Segment::Number(_))) => Ordering::Less,
				/* One side ran out, missing numbers are zero and anything else is compared to the release marker */
				(Some(Segment::Number(a)), None) => a.cmp(&0),
				(None, Some(Segment::Number(b))) => 0.cmp(b),
				(Some(Segment::Text(a)), None) => text_rank(a).cmp(&RELEASE_RANK).then(Ordering::Greater),
				(None, Some(Segment::Text(b))) => RELEASE_RANK.cmp(&text_rank(b)).then(Ordering::Less),
				(None, None) => Ordering::Equal,
			};
			if ord != Ordering::Equal {
				return ord;
			}
		}

		Ordering::Equal
	}
}

impl PartialOrd for PackageVersion {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::hash::Hash for PackageVersion {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.epoch.hash(state);
		let mut segments = self.segments();
		/* Trailing zeros compare equal so they can't take part in the hash */
		while let Some(Segment::Number(0)) = segments.last() {
			segments.pop();
		}
		for segment in segments {
			match segment {
				Segment::Number(n) => n.hash(state),
				Segment::Text(t) => t.to_ascii_lowercase().hash(state),
			}
		}
	}
}

impl std::fmt::Display for PackageVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.epoch != 0 {
			write!(f, "{}!{}", self.epoch, self.raw)
		} else {
			write!(f, "{}", self.raw)
		}
	}
}
