// Pattern Matching Utilities
// Glob-like pattern matching for scan exclusions

/// Check if a single path segment matches a pattern
///
/// `*` matches any run of characters, `?` matches exactly one.
pub fn matches_pattern(segment: &str, pattern: &str) -> bool {
    let name: Vec<char> = segment.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();

    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pat.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    backtrack = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }

    pat[p..].iter().all(|&c| c == '*')
}

/// Pattern matcher for scan exclusions
///
/// A pattern without a slash is tested against every segment of a relative
/// path; a pattern containing a slash must match the whole relative path,
/// segment by segment.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<String>,
}

impl PatternMatcher {
    /// Create a new pattern matcher with the given patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// Check if a canonical relative path should be excluded
    pub fn should_exclude(&self, relative: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.contains('/') {
                let pattern = pattern.trim_matches('/');
                let wanted: Vec<&str> = pattern.split('/').collect();
                let actual: Vec<&str> = relative.split('/').collect();
                wanted.len() == actual.len()
                    && wanted.iter().zip(&actual).all(|(p, s)| matches_pattern(s, p))
            } else {
                relative.split('/').any(|segment| matches_pattern(segment, pattern))
            }
        })
    }

    /// Add a pattern
    pub fn add_pattern(&mut self, pattern: String) {
        self.patterns.push(pattern);
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
