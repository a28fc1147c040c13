use crate::config::RedactionConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap());

// Boundary checks happen around candidate matches instead of in the pattern;
// the regex engine has no lookaround.
static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[.\-\s]?)?\(?\d{3}\)?[.\-\s]?\d{3}[.\-\s]?\d{4}").unwrap()
});

static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b").unwrap()
});

static RE_JWT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\beyJ[A-Za-z0-9_-]{5,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b").unwrap()
});

static RE_BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9\-._~+/]+=*\b").unwrap());

static RE_AWS_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:AKIA|ASIA)[A-Z0-9]{16}\b").unwrap());

static RE_STRIPE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsk_(?:live|test)_[A-Za-z0-9]{16,}\b").unwrap());

static RE_QUERY_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([?&](?:api[_-]?key|token|password|passwd|secret)=)([^&\s]+)").unwrap()
});

static RE_KEY_VALUE_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?P<key>api[_-]?key|token|password|passwd|secret|authorization)\b(?P<sep>\s*[:=]\s*)(?P<value>[^\s,;"']+)"#,
    )
    .unwrap()
});

/// Result of one redaction pass over a piece of text.
#[derive(Debug, Clone, Default)]
pub struct Redaction {
    pub text: String,
    pub count: usize,
    /// Sorted distinct names of the categories that matched.
    pub categories: Vec<String>,
}

fn substitute(re: &Regex, text: &str, replacement: &str) -> (String, usize) {
    let count = re.find_iter(text).count();
    if count == 0 {
        return (text.to_string(), 0);
    }
    (re.replace_all(text, replacement).into_owned(), count)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Phone candidates must sit on non-word boundaries on both sides, so digit
/// runs embedded in identifiers or longer numbers are left alone.
fn substitute_phone(text: &str) -> (String, usize) {
    let mut out = String::new();
    let mut last = 0usize;
    let mut count = 0usize;
    for candidate in RE_PHONE.find_iter(text) {
        let before = text[..candidate.start()].chars().next_back();
        let after = text[candidate.end()..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            continue;
        }
        out.push_str(&text[last..candidate.start()]);
        out.push_str("[REDACTED_PHONE]");
        last = candidate.end();
        count += 1;
    }
    if count == 0 {
        return (text.to_string(), 0);
    }
    out.push_str(&text[last..]);
    (out, count)
}

/// Applies every enabled category to `value` in fixed order. Each category
/// substitutes only its own matches with its own placeholder token; key/value
/// and query-string rules keep the key and separator, masking the value.
pub fn redact_text(config: &RedactionConfig, value: &str) -> Redaction {
    if !config.enabled {
        return Redaction {
            text: value.to_string(),
            count: 0,
            categories: Vec::new(),
        };
    }

    enum Rule {
        Pattern(&'static Lazy<Regex>, &'static str),
        Phone,
    }

    let mut rules: Vec<(&'static str, Rule)> = Vec::new();
    if config.mask_emails {
        rules.push(("email", Rule::Pattern(&RE_EMAIL, "[REDACTED_EMAIL]")));
    }
    if config.mask_phone_numbers {
        rules.push(("phone", Rule::Phone));
    }
    if config.mask_ip_addresses {
        rules.push(("ip", Rule::Pattern(&RE_IPV4, "[REDACTED_IP]")));
    }
    if config.mask_jwts {
        rules.push(("jwt", Rule::Pattern(&RE_JWT, "[REDACTED_JWT]")));
    }
    if config.mask_api_keys {
        rules.push(("bearer_token", Rule::Pattern(&RE_BEARER, "Bearer [REDACTED_TOKEN]")));
        rules.push(("aws_access_key", Rule::Pattern(&RE_AWS_KEY, "[REDACTED_AWS_KEY]")));
        rules.push(("stripe_key", Rule::Pattern(&RE_STRIPE_KEY, "[REDACTED_API_KEY]")));
        rules.push(("query_secret", Rule::Pattern(&RE_QUERY_SECRET, "${1}[REDACTED_SECRET]")));
        rules.push((
            "key_value_secret",
            Rule::Pattern(&RE_KEY_VALUE_SECRET, "${key}${sep}[REDACTED_SECRET]"),
        ));
    }

    let mut text = value.to_string();
    let mut total = 0usize;
    let mut categories: BTreeSet<&'static str> = BTreeSet::new();

    for (name, rule) in rules {
        let (replaced, count) = match rule {
            Rule::Pattern(re, replacement) => substitute(re, &text, replacement),
            Rule::Phone => substitute_phone(&text),
        };
        if count > 0 {
            total += count;
            categories.insert(name);
        }
        text = replaced;
    }

    Redaction {
        text,
        count: total,
        categories: categories.into_iter().map(str::to_string).collect(),
    }
}
