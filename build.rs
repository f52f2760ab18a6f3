use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories holding the crate's own Rust sources.
const SOURCE_DIRS: [&str; 6] = ["harness", "classify", "cohort", "cli", "tests", "benches"];

// One source policy: a line pattern plus a filter that decides whether a matched
// line really violates it.
struct Rule {
    name: &'static str,
    pattern: &'static str,
    applies: fn(&str) -> bool,
    advice: &'static str,
}

// Collects the violating lines of one file for one rule.
struct RuleCollector {
    applies: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for RuleCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.applies)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*")
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

// The text of a comment line without its leading markers.
fn comment_body(line: &str) -> &str {
    line.trim_start()
        .trim_start_matches('/')
        .trim_start_matches('*')
        .trim_start_matches('!')
        .trim()
}

// True when the matched identifier sits outside comments and string literals.
fn underscore_binding_in_code(line: &str) -> bool {
    if is_comment(line) {
        return false;
    }
    !line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn stars_outside_doc_comment(line: &str) -> bool {
    !is_doc_comment(line)
}

fn comment_in_capitals(line: &str) -> bool {
    if !is_comment(line) {
        return false;
    }
    let mut letters = comment_body(line).chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

fn always(line: &str) -> bool {
    !line.is_empty()
}

const RULES: [Rule; 5] = [
    Rule {
        name: "underscore-prefixed identifiers",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        applies: underscore_binding_in_code,
        advice: "Either use the binding under a plain name or remove it completely.",
    },
    Rule {
        name: "change-log comments",
        pattern: r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        applies: always,
        advice: "Comments describe the code as it is, not how it got there.",
    },
    Rule {
        name: "'**' in regular comments",
        pattern: r"(//|/\*).*\*\*",
        applies: stars_outside_doc_comment,
        advice: "Emphasis markup is allowed in doc comments only.",
    },
    Rule {
        name: "comments written entirely in capitals",
        pattern: r"(//|/\*)",
        applies: comment_in_capitals,
        advice: "Rewrite the comment in sentence case or delete it.",
    },
    Rule {
        name: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        applies: always,
        advice: "Either use the code or remove it completely.",
    },
];

fn rust_sources() -> impl Iterator<Item = walkdir::DirEntry> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
}

fn enforce_source_policy() -> Result<(), Box<dyn Error>> {
    let mut searcher = Searcher::new();
    for rule in &RULES {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
        for entry in rust_sources() {
            let mut collector = RuleCollector {
                applies: rule.applies,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, entry.path(), &mut collector)?;
            if !collector.violations.is_empty() {
                let mut message = format!(
                    "\n❌ ERROR: Found {} {} in {}:\n",
                    collector.violations.len(),
                    rule.name,
                    entry.path().display()
                );
                for violation in &collector.violations {
                    message.push_str(&format!("   {violation}\n"));
                }
                message.push_str(&format!("\n⚠️ {}\n", rule.advice));
                return Err(message.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = enforce_source_policy() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=GENEDX_BUILD_TIMESTAMP={timestamp}");
}
