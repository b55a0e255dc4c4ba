//! Include/exclude glob filtering over document paths
//!
//! Patterns use vault-style globs: `*` matches within a path segment,
//! `**` crosses segments, `?` matches a single character, `[...]` is a
//! character class. Compiled to anchored regexes once at construction.

use regex::Regex;

/// Compiled include/exclude filter applied to relative document paths
#[derive(Debug, Clone)]
pub struct PathFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl PathFilter {
    /// Compile glob patterns into a filter
    ///
    /// An empty include list admits every path; excludes always win.
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self, String> {
        Ok(Self {
            includes: compile_patterns(includes)?,
            excludes: compile_patterns(excludes)?,
        })
    }

    /// Filter that admits every path
    pub fn allow_all() -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Whether the path passes the include list and misses the exclude list
    pub fn matches(&self, path: &str) -> bool {
        let included =
            self.includes.is_empty() || self.includes.iter().any(|re| re.is_match(path));

        included && !self.excludes.iter().any(|re| re.is_match(path))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, String> {
    patterns
        .iter()
        .map(|p| {
            let source = glob_to_regex(p);
            Regex::new(&source).map_err(|e| format!("pattern '{}': {}", p, e))
        })
        .collect()
}

/// Translate a glob pattern into an anchored regex source string
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    // `**/` may match zero directories; bare `**` matches anything
                    if chars.get(i + 2) == Some(&'/') {
                        out.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                out.push('[');
                i += 1;
                if chars.get(i) == Some(&'!') {
                    out.push('^');
                    i += 1;
                }
                // Class body passes through; an unclosed class fails at
                // Regex::new, which is the error the caller reports
                while i < chars.len() && chars[i] != ']' {
                    out.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    out.push(']');
                    i += 1;
                }
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    out.push('$');
    out
}
