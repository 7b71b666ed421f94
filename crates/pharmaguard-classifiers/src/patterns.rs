//! Keyword and route-name matchers
//!
//! Paths are scanned for keywords with Aho-Corasick; route names are matched
//! against `*` globs (`prescription.*`) compiled into a single regex set.

use aho_corasick::AhoCorasick;
use pharmaguard_core::{Error, Result};
use regex::{RegexSet, RegexSetBuilder};

/// Case-insensitive substring matcher
#[derive(Debug, Clone)]
pub struct KeywordSet {
    matcher: AhoCorasick,
    keywords: Vec<String>,
}

impl KeywordSet {
    /// Build a matcher over the given keywords
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords: Vec<String> = keywords.into_iter().map(Into::into).collect();

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&keywords)
            .map_err(|e| Error::classification(format!("Failed to build keyword matcher: {}", e)))?;

        Ok(Self { matcher, keywords })
    }

    /// Whether any keyword occurs in `text`
    pub fn is_match(&self, text: &str) -> bool {
        !self.keywords.is_empty() && self.matcher.is_match(text)
    }

    /// First keyword found in `text`
    pub fn find(&self, text: &str) -> Option<&str> {
        if self.keywords.is_empty() {
            return None;
        }
        self.matcher
            .find(text)
            .map(|m| self.keywords[m.pattern().as_usize()].as_str())
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Set of `*` globs matched against whole route names
#[derive(Debug, Clone)]
pub struct GlobSet {
    set: RegexSet,
    globs: Vec<String>,
}

impl GlobSet {
    /// Compile globs; `*` matches any run of characters, everything else is literal
    pub fn new<I, S>(globs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let globs: Vec<String> = globs.into_iter().map(Into::into).collect();
        let patterns: Vec<String> = globs.iter().map(|g| glob_to_regex(g)).collect();

        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::classification(format!("Failed to compile route globs: {}", e)))?;

        Ok(Self { set, globs })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    /// Match an optional route name; unnamed routes never match
    pub fn matches_name(&self, name: Option<&str>) -> bool {
        name.is_some_and(|n| self.is_match(n))
    }

    pub fn globs(&self) -> &[String] {
        &self.globs
    }
}

fn glob_to_regex(glob: &str) -> String {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{}$", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_set() {
        let set = KeywordSet::new(["/api/", "prescription"]).unwrap();

        assert!(set.is_match("/API/v1/orders"));
        assert!(set.is_match("/patients/3/Prescriptions"));
        assert!(!set.is_match("/dashboard"));
        assert_eq!(set.find("/prescription/42"), Some("prescription"));
    }

    #[test]
    fn test_empty_keyword_set_never_matches() {
        let set = KeywordSet::new(Vec::<String>::new()).unwrap();
        assert!(!set.is_match("/anything"));
        assert_eq!(set.find("/anything"), None);
    }

    #[test]
    fn test_glob_set() {
        let set = GlobSet::new(["prescription.*", "admin.*", "login"]).unwrap();

        assert!(set.is_match("prescription.show"));
        assert!(set.is_match("admin.users.index"));
        assert!(set.is_match("login"));
        assert!(!set.is_match("prescriptions"));
        assert!(!set.is_match("login.form"));
        assert!(!set.matches_name(None));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let set = GlobSet::new(["api.v1+"]).unwrap();
        assert!(set.is_match("api.v1+"));
        assert!(!set.is_match("apixv11"));
    }
}
