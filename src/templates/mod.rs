//! `{placeholder}` rendering shared by guest messages and bulk email.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

pub mod defaults;
pub mod guest_messenger;

pub use guest_messenger::{GeneratedMessage, GuestMessenger, ScheduledMessage};

pub type Context = HashMap<String, String>;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid"))
}

/// Substitutes every `{name}` found in `context` in one pass.
///
/// Placeholders missing from the context are left untouched, and substituted
/// values are never expanded again.
pub fn render(template: &str, context: &Context) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| match context.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Distinct placeholder names, sorted.
pub fn placeholders(template: &str) -> BTreeSet<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

pub fn missing_variables(template: &str, context: &Context) -> BTreeSet<String> {
    placeholders(template)
        .into_iter()
        .filter(|name| !context.contains_key(name))
        .collect()
}
