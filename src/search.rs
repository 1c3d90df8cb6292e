//! Free-text search query parsing for collection filters.
//!
//! A query is a comma-separated list of terms. A `+` prefix marks a term as
//! mandatory, a `-` prefix excludes it, and unprefixed terms are optional
//! "match at least one" terms. There is no escaping for literal `+`, `-` or
//! `,` characters; a term cannot contain a comma.

/// The parsed form of a filter query, split into its three term classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTerms {
    pub mandatory: Vec<String>,
    pub excluded: Vec<String>,
    pub included: Vec<String>,
}

impl SearchTerms {
    /// Parse a comma-separated query string. Tokens are trimmed and empty
    /// tokens (including bare `+`/`-`) are dropped silently.
    pub fn parse(query: &str) -> Self {
        let mut terms = Self::default();
        for raw in query.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            if let Some(rest) = token.strip_prefix('+') {
                let rest = rest.trim();
                if !rest.is_empty() {
                    terms.mandatory.push(rest.to_string());
                }
            } else if let Some(rest) = token.strip_prefix('-') {
                let rest = rest.trim();
                if !rest.is_empty() {
                    terms.excluded.push(rest.to_string());
                }
            } else {
                terms.included.push(token.to_string());
            }
        }
        terms
    }

    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.excluded.is_empty() && self.included.is_empty()
    }

    /// Case-insensitive substring match: every mandatory term must be
    /// present, no excluded term may be present, and when any included terms
    /// were given at least one of them must be present.
    pub fn matches(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        let contains = |term: &String| haystack.contains(&term.to_lowercase());

        self.mandatory.iter().all(contains)
            && !self.excluded.iter().any(contains)
            && (self.included.is_empty() || self.included.iter().any(contains))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_term_classes() {
        let terms = SearchTerms::parse("+beatles, -remaster, love, yesterday");
        assert_eq!(terms.mandatory, vec!["beatles"]);
        assert_eq!(terms.excluded, vec!["remaster"]);
        assert_eq!(terms.included, vec!["love", "yesterday"]);
    }

    #[test]
    fn drops_empty_tokens() {
        let terms = SearchTerms::parse(" , +, - ,  ,abba");
        assert_eq!(terms.mandatory, Vec::<String>::new());
        assert_eq!(terms.excluded, Vec::<String>::new());
        assert_eq!(terms.included, vec!["abba"]);
    }

    #[test]
    fn empty_query_matches_everything() {
        let terms = SearchTerms::parse("");
        assert!(terms.is_empty());
        assert!(terms.matches("anything at all"));
        assert!(terms.matches(""));
    }

    #[test]
    fn mandatory_terms_are_conjunctive() {
        let terms = SearchTerms::parse("+lennon, +mccartney");
        assert!(terms.matches("Lennon / McCartney"));
        assert!(!terms.matches("Lennon / Harrison"));
    }

    #[test]
    fn excluded_terms_reject() {
        let terms = SearchTerms::parse("beatles, -tribute");
        assert!(terms.matches("The Beatles"));
        assert!(!terms.matches("The Beatles Tribute Band"));
    }

    #[test]
    fn included_terms_need_only_one_match() {
        let terms = SearchTerms::parse("stones, kinks");
        assert!(terms.matches("The Rolling Stones"));
        assert!(terms.matches("The Kinks"));
        assert!(!terms.matches("The Who"));
    }

    #[test]
    fn included_is_vacuous_when_only_prefixed_terms() {
        let terms = SearchTerms::parse("+live");
        assert!(terms.matches("Live at Leeds"));
        assert!(!terms.matches("Studio Sessions"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let terms = SearchTerms::parse("+BEATLES");
        assert!(terms.matches("the beatles"));
    }
}
