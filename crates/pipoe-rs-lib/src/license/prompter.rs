use std::io::{BufRead, Write};

/// Asked for a license token when a license term has no mapping.
///
/// Only the coordinating resolver task calls this, so at most one prompt is ever outstanding.
pub trait Prompter: Send {
	/// Returns the license to use for `term`, `None` declines.
	fn prompt(&mut self, package: &str, term: &str) -> Option<String>;
}

impl<P: Prompter + ?Sized> Prompter for Box<P> {
	fn prompt(&mut self, package: &str, term: &str) -> Option<String> {
		(**self).prompt(package, term)
	}
}

/// Never answers, every unmapped term gets the default license.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
	fn prompt(&mut self, _package: &str, _term: &str) -> Option<String> {
		None
	}
}

/// Asks the operator on the terminal, an empty answer declines.
///
/// Reading stdin blocks. On a multi-threaded tokio runtime the read is moved off the
/// worker with [`block_in_place`](tokio::task::block_in_place) so fetches already sent keep
/// completing while the operator types.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
	fn ask(package: &str, term: &str) -> Option<String> {
		let stdin = std::io::stdin();
		eprintln!("Failed to translate license of {}: {}", package, if term.is_empty() { "<none>" } else { term });
		eprint!("Please enter a valid license name (empty to use the default): ");
		let _ = std::io::stderr().flush();

		let mut input = String::new();
		match stdin.lock().read_line(&mut input) {
			Ok(_) => Some(input.trim().to_string()).filter(|s| !s.is_empty()),
			Err(e) => {
				log::error!("Failed to read license from stdin: {}", e);
				None
			},
		}
	}
}

impl Prompter for StdinPrompter {
	fn prompt(&mut self, package: &str, term: &str) -> Option<String> {
		blocking(|| Self::ask(package, term))
	}
}

/// Runs `f` through [`block_in_place`](tokio::task::block_in_place) where the runtime allows it.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
	match tokio::runtime::Handle::try_current().map(|h| h.runtime_flavor()) {
		Ok(tokio::runtime::RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
		_ => f(),
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn blocking_outside_runtime() { assert_eq!(blocking(|| 1), 1) }

	#[tokio::test]
	async fn blocking_on_current_thread_runtime() {
		assert_eq!(blocking(|| 2), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn blocking_on_multi_thread_runtime() {
		let handle = tokio::spawn(async { blocking(|| std::thread::sleep(std::time::Duration::from_millis(10))) });
		let other = tokio::spawn(async { 3 });
		assert_eq!(other.await.unwrap(), 3);
		handle.await.unwrap();
	}
}
