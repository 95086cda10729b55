//! NAPTR Regexp field evaluation: pattern/replace splitting, matching, and
//! backreference substitution.

use regex::Regex;
use tracing::warn;

use crate::context::MAX_DOMAIN_NAME_LEN;

/// Splits a wire Regexp field of the form `!pattern!replace!` into its
/// pattern and replace halves.
///
/// Splitting happens on unescaped `!` separators; `\!` inside either half is
/// kept (with the escape removed). A field that does not yield both halves,
/// the empty field included, comes back as two empty strings.
pub fn split_regexp(raw: &str) -> (String, String) {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            if c != '!' {
                current.push('\\');
            }
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '!' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    if tokens.len() < 2 {
        return (String::new(), String::new());
    }
    let mut it = tokens.into_iter();
    let pattern = it.next().expect("two tokens present");
    let replace = it.next().expect("two tokens present");
    (pattern, replace)
}

/// Unanchored match of `pattern` against `input`. A pattern that fails to
/// compile matches nothing.
pub fn reg_match(pattern: &str, input: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(input),
        Err(e) => {
            warn!("unable to compile NAPTR pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// Applies a NAPTR rewrite: matches `pattern` against `input` and, on
/// success, expands `replacement` with capture backreferences `\1`..`\9`
/// (`\\` is a literal backslash). The expansion is the whole result, capped
/// at the domain name capacity.
///
/// Returns `None` when the pattern does not compile or does not match.
///
/// # Examples
///
/// ```
/// use epcdns::rewrite::reg_replace;
///
/// let out = reg_replace(
///     "([a-z0-9]+)(..*)",
///     r"\1.apn.epc.mnc999.mcc999.3gppnetwork.org",
///     "mms.apn.epc.mnc001.mcc001.3gppnetwork.org.nickvsnetworking.com",
/// );
/// assert_eq!(out.as_deref(), Some("mms.apn.epc.mnc999.mcc999.3gppnetwork.org"));
/// ```
pub fn reg_replace(pattern: &str, replacement: &str, input: &str) -> Option<String> {
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("unable to compile NAPTR pattern '{}': {}", pattern, e);
            return None;
        }
    };
    let caps = re.captures(input)?;

    let mut out = String::new();
    let mut chars = replacement.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '1'..='9') => {
                let idx = d.to_digit(10).expect("digit") as usize;
                if let Some(group) = caps.get(idx) {
                    out.push_str(group.as_str());
                }
            }
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    if out.len() > MAX_DOMAIN_NAME_LEN {
        out = out.chars().take(MAX_DOMAIN_NAME_LEN).collect();
    }
    Some(out)
}
