//! Rule-mode site separation.
//!
//! Compiles location records into an ordered list of hostname rules:
//! - sort by location then hostname
//! - bucket same-location runs up to a size bound
//! - literal alternation or synthesized pattern per bucket
//! - trailing catch-all rule

mod compile;
mod evaluate;

pub use compile::{
    compile, compile_buckets, CompileOptions, PatternSynthesizer, DEFAULT_LITERAL_GROUP_SIZE,
    DEFAULT_SYNTHESIZED_GROUP_SIZE,
};
pub use evaluate::RuleMatcher;

use crate::model::{Rule, RuleKind};

/// Put freshly compiled rules ahead of rules that already exist on the
/// platform, then close the list with a catch-all to `catch_all_site` unless
/// it already ends in one. Existing rules are never modified.
///
/// `new_rules` must not carry their own catch-all (see [`compile_buckets`]).
pub fn prepend_to_existing(
    new_rules: Vec<Rule>,
    existing: Vec<Rule>,
    catch_all_site: &str,
    kind: RuleKind,
) -> Vec<Rule> {
    if !existing.is_empty() {
        tracing::warn!(
            "Adding {} rules on top of {} existing ones, duplicates may remain",
            new_rules.len(),
            existing.len()
        );
    }

    let mut rules = new_rules;
    rules.extend(existing);
    if !rules.last().is_some_and(Rule::is_catch_all) {
        rules.push(Rule::catch_all_to(catch_all_site, kind));
    }
    rules
}
