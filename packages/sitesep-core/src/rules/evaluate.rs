use crate::error::{Result, SiteSepError};
use crate::model::{Rule, Transformation};
use regex::Regex;

/// Compiled rule list that classifies hostnames first-match-wins, the way the
/// consuming platform evaluates site separation rules.
pub struct RuleMatcher<'r> {
    compiled: Vec<(Regex, &'r Rule)>,
}

impl<'r> RuleMatcher<'r> {
    pub fn new(rules: &'r [Rule]) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule))
                    .map_err(|e| SiteSepError::MalformedPattern {
                        pattern: rule.pattern.clone(),
                        site: rule.site_name.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { compiled })
    }

    /// Site name of the first rule matching `hostname`, if any.
    pub fn classify(&self, hostname: &str) -> Option<&'r str> {
        self.compiled.iter().find_map(|(re, rule)| {
            let candidate = match rule.transformation {
                Transformation::None => re.is_match(hostname),
                Transformation::Uppercase => re.is_match(&hostname.to_uppercase()),
                Transformation::Lowercase => re.is_match(&hostname.to_lowercase()),
            };
            candidate.then_some(rule.site_name.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::CasePolicy;
    use crate::model::{LocationRecord, CATCH_ALL_SITE};
    use crate::rules::{compile, CompileOptions};

    #[test]
    fn test_first_match_wins() {
        let records = vec![
            LocationRecord::new("web01", "NYC"),
            LocationRecord::new("db01", "LAX"),
        ];
        let rules = compile(&records, &CompileOptions::default(), None).unwrap();
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.classify("web01"), Some("NYC"));
        assert_eq!(matcher.classify("Db01"), Some("LAX"));
        assert_eq!(matcher.classify("fw-99"), Some(CATCH_ALL_SITE));
    }

    #[test]
    fn test_exact_rules_are_case_sensitive() {
        let records = vec![LocationRecord::new("web01", "NYC")];
        let options = CompileOptions::literal(CasePolicy::Exact);
        let rules = compile(&records, &options, None).unwrap();
        let matcher = RuleMatcher::new(&rules).unwrap();

        assert_eq!(matcher.classify("web01"), Some("NYC"));
        assert_eq!(matcher.classify("WEB01"), Some(CATCH_ALL_SITE));
    }

    #[test]
    fn test_no_rules_no_site() {
        let matcher = RuleMatcher::new(&[]).unwrap();
        assert_eq!(matcher.classify("web01"), None);
    }
}
