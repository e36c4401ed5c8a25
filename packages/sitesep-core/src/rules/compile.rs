use crate::case::CasePolicy;
use crate::error::{Result, SiteSepError};
use crate::model::{validate_records, LocationRecord, Rule, RuleKind};
use std::collections::HashMap;

/// Hostnames per rule when patterns are literal alternations
pub const DEFAULT_LITERAL_GROUP_SIZE: usize = 10;

/// Hostnames per rule when patterns come from a synthesizer
pub const DEFAULT_SYNTHESIZED_GROUP_SIZE: usize = 20;

/// Generalizes a list of literal hostnames into one pattern.
pub trait PatternSynthesizer {
    fn synthesize(&self, hostnames: &[String]) -> anyhow::Result<String>;
}

impl<F> PatternSynthesizer for F
where
    F: Fn(&[String]) -> anyhow::Result<String>,
{
    fn synthesize(&self, hostnames: &[String]) -> anyhow::Result<String> {
        self(hostnames)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Upper bound on hostnames per rule
    pub max_group_size: usize,
    pub case: CasePolicy,
    pub kind: RuleKind,
}

impl CompileOptions {
    pub fn literal(case: CasePolicy) -> Self {
        Self {
            max_group_size: DEFAULT_LITERAL_GROUP_SIZE,
            case,
            kind: RuleKind::default(),
        }
    }

    pub fn synthesized(case: CasePolicy) -> Self {
        Self {
            max_group_size: DEFAULT_SYNTHESIZED_GROUP_SIZE,
            ..Self::literal(case)
        }
    }

    pub fn with_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::literal(CasePolicy::default())
    }
}

/// Compile location records into rules, ending with the catch-all rule.
///
/// Empty input yields just the catch-all rule.
pub fn compile(
    records: &[LocationRecord],
    options: &CompileOptions,
    synthesizer: Option<&dyn PatternSynthesizer>,
) -> Result<Vec<Rule>> {
    let mut rules = compile_buckets(records, options, synthesizer)?;
    rules.push(Rule::catch_all(options.kind));
    Ok(rules)
}

/// Compile location records into bucket rules without the trailing catch-all.
///
/// Records are sorted by `(location, hostname)` and cut into runs of the same
/// location holding at most `max_group_size` hostnames. A hostname listed more
/// than once (after the case policy) keeps only its last occurrence in that
/// order. Any synthesizer failure aborts the whole compilation.
pub fn compile_buckets(
    records: &[LocationRecord],
    options: &CompileOptions,
    synthesizer: Option<&dyn PatternSynthesizer>,
) -> Result<Vec<Rule>> {
    if options.max_group_size == 0 {
        return Err(SiteSepError::InvalidGroupSize);
    }
    validate_records(records)?;

    let entries = sorted_unique(records, options.case);

    let mut rules = Vec::new();
    let mut bucket: Vec<String> = Vec::with_capacity(options.max_group_size);
    let mut sources: Vec<&str> = Vec::with_capacity(options.max_group_size);
    let mut bucket_location: Option<&str> = None;

    for (hostname, source, location) in entries {
        let location_changed = bucket_location.is_some_and(|current| current != location);
        if location_changed || bucket.len() == options.max_group_size {
            if let Some(current) = bucket_location {
                rules.push(build_rule(&bucket, &sources, current, options, synthesizer)?);
            }
            bucket.clear();
            sources.clear();
        }
        bucket_location = Some(location);
        bucket.push(hostname);
        sources.push(source);
    }

    if let Some(current) = bucket_location {
        rules.push(build_rule(&bucket, &sources, current, options, synthesizer)?);
    }

    tracing::info!(
        "Compiled {} records into {} rules (max {} hostnames per rule, {} case)",
        records.len(),
        rules.len(),
        options.max_group_size,
        options.case
    );

    Ok(rules)
}

/// Sort by (location, hostname) and drop all but the last occurrence of each
/// case-normalized hostname. Yields `(transformed hostname, source hostname,
/// location)`.
fn sorted_unique(records: &[LocationRecord], case: CasePolicy) -> Vec<(String, &str, &str)> {
    let mut sorted: Vec<&LocationRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.hostname.cmp(&b.hostname))
    });

    let keyed: Vec<(String, &str, &str)> = sorted
        .iter()
        .map(|r| {
            (
                case.apply(&r.hostname).into_owned(),
                r.hostname.as_str(),
                r.location.as_str(),
            )
        })
        .collect();

    let mut last_seen: HashMap<&str, (usize, &str)> = HashMap::with_capacity(keyed.len());
    for (idx, (hostname, _, location)) in keyed.iter().enumerate() {
        if let Some((_, previous)) = last_seen.insert(hostname.as_str(), (idx, *location)) {
            if previous != *location {
                tracing::warn!(
                    "Hostname {} listed for both '{}' and '{}', keeping '{}'",
                    hostname,
                    previous,
                    location,
                    location
                );
            }
        }
    }

    let keep: Vec<bool> = keyed
        .iter()
        .enumerate()
        .map(|(idx, (hostname, _, _))| last_seen.get(hostname.as_str()).map(|(last, _)| *last) == Some(idx))
        .collect();

    keyed
        .into_iter()
        .zip(keep)
        .filter_map(|(entry, keep)| keep.then_some(entry))
        .collect()
}

fn build_rule(
    hostnames: &[String],
    sources: &[&str],
    location: &str,
    options: &CompileOptions,
    synthesizer: Option<&dyn PatternSynthesizer>,
) -> Result<Rule> {
    let synthesized = synthesizer.is_some();
    let pattern = match synthesizer {
        Some(synth) => synth
            .synthesize(hostnames)
            .map_err(|source| SiteSepError::PatternSynthesis {
                first: hostnames.first().cloned().unwrap_or_default(),
                last: hostnames.last().cloned().unwrap_or_default(),
                source,
            })?,
        None => hostnames.join("|"),
    };

    check_pattern(&pattern, location)?;

    tracing::debug!(
        "Rule for '{}': {} hostnames -> {}",
        location,
        hostnames.len(),
        pattern
    );

    // Literal rules are annotated with the hostnames as written in the source
    let note = if synthesized {
        format!("{} >> {}", pattern, location)
    } else {
        format!("{} >> {}", sources.join("|"), location)
    };

    Ok(Rule {
        note,
        pattern,
        site_name: location.to_string(),
        transformation: options.case.transformation(),
        kind: options.kind,
        extra: Default::default(),
    })
}

fn check_pattern(pattern: &str, site: &str) -> Result<()> {
    let malformed = |reason: String| SiteSepError::MalformedPattern {
        pattern: pattern.to_string(),
        site: site.to_string(),
        reason,
    };

    if pattern.trim().is_empty() {
        return Err(malformed("pattern is empty".to_string()));
    }
    regex::Regex::new(pattern).map_err(|e| malformed(e.to_string()))?;
    Ok(())
}
