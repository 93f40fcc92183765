use regex::Regex;
use serde::{Deserialize, Serialize};

/// How a query is matched against each line of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
	#[default]
	Substring,
	Regex,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
	pub max_results: usize,
	pub mode: SearchMode,
	pub context_before: usize,
	pub context_after: usize,
	pub count_only: bool,
}

/// A single hit inside a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
	pub path: String,
	/// 1-indexed.
	pub line: usize,
	/// 1-indexed byte column.
	pub column: usize,
	pub match_text: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub context_before: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub context_after: Option<Vec<String>>,
}

fn find_in_line(
	line: &str,
	query: &str,
	mode: &SearchMode,
	compiled_regex: Option<&Regex>,
) -> Option<(usize, String)> {
	match mode {
		SearchMode::Substring => line.find(query).map(|pos| (pos, query.to_string())),
		SearchMode::Regex => compiled_regex
			.and_then(|re| re.find(line))
			.map(|m| (m.start(), m.as_str().to_string())),
	}
}

fn non_empty(lines: &[&str]) -> Option<Vec<String>> {
	if lines.is_empty() {
		None
	} else {
		Some(lines.iter().map(|s| s.to_string()).collect())
	}
}

/// Search one file's text, pushing into `results` or bumping `count`.
///
/// Returns `true` once `max_results` is reached. In `count_only` mode no
/// matches are built and the cap does not apply.
pub fn search_text(
	path: &str,
	text: &str,
	query: &str,
	options: &SearchOptions,
	compiled_regex: Option<&Regex>,
	count: &mut usize,
	results: &mut Vec<SearchMatch>,
) -> bool {
	let lines: Vec<&str> = text.lines().collect();

	for (idx, line) in lines.iter().enumerate() {
		let Some((col, match_text)) = find_in_line(line, query, &options.mode, compiled_regex)
		else {
			continue;
		};

		if options.count_only {
			*count += 1;
			continue;
		}

		let before_start = idx.saturating_sub(options.context_before);
		let after_end = (idx + 1 + options.context_after).min(lines.len());

		results.push(SearchMatch {
			path: path.to_string(),
			line: idx + 1,
			column: col + 1,
			match_text,
			context_before: non_empty(&lines[before_start..idx]),
			context_after: non_empty(&lines[idx + 1..after_end]),
		});

		if results.len() >= options.max_results {
			return true;
		}
	}

	false
}

#[cfg(test)]
mod tests {
	use super::*;

	fn substring_options() -> SearchOptions {
		SearchOptions {
			max_results: 100,
			mode: SearchMode::Substring,
			context_before: 0,
			context_after: 0,
			count_only: false,
		}
	}

	fn run(text: &str, query: &str, opts: &SearchOptions, re: Option<&Regex>) -> (bool, usize, Vec<SearchMatch>) {
		let mut results = Vec::new();
		let mut count = 0;
		let hit = search_text("/log.txt", text, query, opts, re, &mut count, &mut results);
		(hit, count, results)
	}

	#[test]
	fn substring_search_finds_lines_and_columns() {
		let (hit, _, results) = run("cast line\nreel in\nno bite, cast again", "cast", &substring_options(), None);

		assert!(!hit);
		assert_eq!(results.len(), 2);
		assert_eq!((results[0].line, results[0].column), (1, 1));
		assert_eq!((results[1].line, results[1].column), (3, 10));
		assert_eq!(results[1].match_text, "cast");
	}

	#[test]
	fn regex_search_reports_matched_text() {
		let re = Regex::new(r"trout \d+cm").unwrap();
		let opts = SearchOptions {
			mode: SearchMode::Regex,
			..substring_options()
		};
		let (_, _, results) = run("caught trout 40cm\nmissed\ntrout 12cm", "", &opts, Some(&re));

		assert_eq!(results.len(), 2);
		assert_eq!(results[0].match_text, "trout 40cm");
		assert_eq!(results[0].column, 8);
		assert_eq!(results[1].line, 3);
	}

	#[test]
	fn context_lines_are_captured_and_clamped() {
		let opts = SearchOptions {
			context_before: 5,
			context_after: 1,
			..substring_options()
		};
		let (_, _, results) = run("one\ntwo\nthree\nfour", "two", &opts, None);

		assert_eq!(results[0].context_before, Some(vec!["one".to_string()]));
		assert_eq!(results[0].context_after, Some(vec!["three".to_string()]));
	}

	#[test]
	fn no_context_at_file_edges() {
		let opts = SearchOptions {
			context_before: 3,
			context_after: 3,
			..substring_options()
		};
		let (_, _, results) = run("only line", "only", &opts, None);

		assert_eq!(results[0].context_before, None);
		assert_eq!(results[0].context_after, None);
	}

	#[test]
	fn count_only_is_uncapped() {
		let opts = SearchOptions {
			max_results: 2,
			count_only: true,
			..substring_options()
		};
		let (hit, count, results) = run("x\nx\nx\nx", "x", &opts, None);

		assert!(!hit);
		assert_eq!(count, 4);
		assert!(results.is_empty());
	}

	#[test]
	fn stops_at_max_results() {
		let opts = SearchOptions {
			max_results: 3,
			..substring_options()
		};
		let (hit, _, results) = run("m\nm\nm\nm\nm", "m", &opts, None);

		assert!(hit);
		assert_eq!(results.len(), 3);
	}
}
