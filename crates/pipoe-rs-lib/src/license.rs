//! Translation of free-text package licenses into license names the build framework accepts.
//!
//! Raw license strings are looked up by exact text in a [`LicenseStore`], compound strings
//! (`MIT OR Apache-2.0`) are split and each term looked up on its own. Terms with no mapping are
//! given to a [`Prompter`]; an answer is remembered in the store, a refusal falls back to the
//! configured default license and is reported without being remembered.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::report::Diagnostic;

mod store;
pub use store::LicenseStore;

mod prompter;
pub use prompter::Prompter;
pub use prompter::NonInteractive;
pub use prompter::StdinPrompter;

/// How multiple license tokens combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Conjunction {
	/// Every license applies.
	#[default] All,
	/// The licensee may choose.
	Any,
}

/// A non-empty, sorted set of license tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LicenseExpression {
	tokens: BTreeSet<String>,
	conjunction: Conjunction,
}

impl LicenseExpression {
	/// `None` when `tokens` has no non-blank entry.
	pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>, conjunction: Conjunction) -> Option<Self> {
		let tokens: BTreeSet<String> = tokens.into_iter()
			.map(Into::into)
			.map(|t: String| t.trim().to_string())
			.filter(|t| !t.is_empty())
			.collect();
		if tokens.is_empty() {
			None
		} else {
			Some(Self { tokens, conjunction })
		}
	}

	/// Just [`FALLBACK_LICENSE`](crate::config::FALLBACK_LICENSE).
	pub fn closed() -> Self {
		Self { tokens: BTreeSet::from([crate::config::FALLBACK_LICENSE.to_string()]), conjunction: Conjunction::All }
	}

	pub fn single(token: &str) -> Option<Self> {
		Self::new([token], Conjunction::All)
	}

	pub fn tokens(&self) -> &BTreeSet<String> {
		&self.tokens
	}

	pub fn conjunction(&self) -> Conjunction {
		self.conjunction
	}
}

/// Rendered in BitBake `LICENSE` syntax, `&` for all-of and `|` for any-of.
impl std::fmt::Display for LicenseExpression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let separator = match self.conjunction {
			Conjunction::All => " & ",
			Conjunction::Any => " | ",
		};
		write!(f, "{}", self.tokens.iter().cloned().collect::<Vec<_>>().join(separator))
	}
}

/// The result of normalizing one package's license.
#[derive(Debug, Clone)]
pub struct Normalized {
	pub expression: LicenseExpression,
	/// Fallbacks taken while normalizing.
	pub diagnostics: Vec<Diagnostic>,
}

fn separator_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"(?i)\s+(or|and)\s+").expect("license separator regex is valid"))
}

pub struct LicenseMapper<P: Prompter> {
	store: LicenseStore,
	prompter: P,
	default_license: String,
	/// Terms the operator declined to map this run, they aren't asked again.
	declined: HashSet<String>,
}

impl<P: Prompter> LicenseMapper<P> {
	/// # Parameters
	/// - `store` - Known mappings, grows as the operator answers prompts.
	/// - `prompter` - Asked for terms the store doesn't know.
	/// - `default_license` - Used for terms nobody could map.
	pub fn new(store: LicenseStore, prompter: P, default_license: impl Into<String>) -> Self {
		let default_license = default_license.into();
		let default_license = if default_license.trim().is_empty() { crate::config::FALLBACK_LICENSE.to_string() } else { default_license };
		Self { store, prompter, default_license, declined: Default::default() }
	}

	pub fn store(&self) -> &LicenseStore {
		&self.store
	}

	pub fn into_store(self) -> LicenseStore {
		self.store
	}

	/// Normalizes `raw` into license tokens.
	pub fn normalize(&mut self, package: &str, raw: &str) -> Normalized {
		self.normalize_with_classifiers(package, raw, &[])
	}

	/// Normalizes `raw`, consulting `License :: ...` trove classifiers when the raw text is empty or
	/// is a single unmapped term.
	pub fn normalize_with_classifiers(&mut self, package: &str, raw: &str, classifiers: &[String]) -> Normalized {
		let raw = raw.trim().trim_matches(|c| c == '\'' || c == '"').trim();
		let mut diagnostics = Vec::<Diagnostic>::new();

		if !raw.is_empty() {
			if let Some(expression) = self.store.get(raw).and_then(|t| LicenseExpression::new(t.iter().cloned(), Conjunction::All)) {
				return Normalized { expression, diagnostics };
			}
		}

		let from_classifiers = classifiers.iter()
			.filter(|c| c.starts_with("License"))
			.find_map(|c| self.store.get(c))
			.and_then(|t| LicenseExpression::new(t.iter().cloned(), Conjunction::All));

		if raw.is_empty() {
			let expression = from_classifiers.unwrap_or_else(|| {
				diagnostics.push(Diagnostic::LicenseFallback { package: package.to_string(), term: String::new(), license: self.default_license.clone() });
				self.default_expression()
			});
			return Normalized { expression, diagnostics };
		}

		let mut conjunction = Conjunction::Any;
		let mut terms = Vec::<&str>::new();
		let mut last = 0;
		for captures in separator_regex().captures_iter(raw) {
			let whole = captures.get(0).expect("capture group 0 always exists");
			if captures[1].eq_ignore_ascii_case("and") {
				conjunction = Conjunction::All;
			}
			terms.push(&raw[last..whole.start()]);
			last = whole.end();
		}
		terms.push(&raw[last..]);

		let terms: Vec<&str> = terms.into_iter()
			.map(|t| t.trim().trim_matches(|c| c == '(' || c == ')').trim())
			.filter(|t| !t.is_empty())
			.collect();

		if terms.len() <= 1 {
			if let Some(expression) = from_classifiers {
				return Normalized { expression, diagnostics };
			}
			conjunction = Conjunction::All;
		}

		let mut tokens = BTreeSet::<String>::new();
		for term in terms {
			match self.store.get(term) {
				Some(mapped) => tokens.extend(mapped.iter().cloned()),
				None => tokens.extend(self.resolve_unmapped(package, term, &mut diagnostics)),
			}
		}

		let expression = LicenseExpression::new(tokens, conjunction).unwrap_or_else(|| self.default_expression());
		Normalized { expression, diagnostics }
	}

	fn resolve_unmapped(&mut self, package: &str, term: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<String> {
		if !self.declined.contains(term) {
			log::info!("Failed to translate license \"{}\" of {}", term, package);
			let answer = self.prompter.prompt(package, term)
				.map(|a| a.split(|c: char| c.is_whitespace() || c == '&' || c == '|').filter(|t| !t.is_empty()).map(str::to_string).collect::<Vec<_>>())
				.filter(|tokens| !tokens.is_empty());

			if let Some(tokens) = answer {
				self.store.insert(term, tokens.clone());
				return tokens;
			}
			self.declined.insert(term.to_string());
		}

		diagnostics.push(Diagnostic::LicenseFallback { package: package.to_string(), term: term.to_string(), license: self.default_license.clone() });
		vec![self.default_license.clone()]
	}

	fn default_expression(&self) -> LicenseExpression {
		LicenseExpression::single(&self.default_license)
			.unwrap_or_else(|| LicenseExpression::single(crate::config::FALLBACK_LICENSE).expect("fallback license is not blank"))
	}
}
