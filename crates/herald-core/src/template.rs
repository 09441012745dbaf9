//! Template rendering: variant selection and `{{token}}` substitution.

use rand::Rng;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::job::{Contact, Template};

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("token pattern is valid"))
}

/// Pick the body to send: a uniformly random usable variant, or the static
/// content when the template has none.
pub fn select_variant<'a, R: Rng + ?Sized>(template: &'a Template, rng: &mut R) -> &'a str {
    let usable = template.usable_variants();
    if usable.is_empty() {
        return &template.static_content;
    }
    usable[rng.gen_range(0..usable.len())]
}

/// Replace `{{key}}` tokens from `values`. Unknown tokens are left verbatim.
pub fn substitute(text: &str, values: &HashMap<&str, &str>) -> String {
    token_regex()
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => (*value).to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render the message for one contact.
///
/// `name` and `phone` come from the contact itself and win over extra fields
/// of the same key.
pub fn render<R: Rng + ?Sized>(template: &Template, contact: &Contact, rng: &mut R) -> String {
    let mut values: HashMap<&str, &str> = contact
        .extra_fields
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    values.insert("name", &contact.name);
    values.insert("phone", &contact.phone);

    substitute(select_variant(template, rng), &values)
}
