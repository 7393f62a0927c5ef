//! Canonical forms and content hashes for schema objects.
//!
//! Constraint, index and trigger maps are keyed by a hash of the object's
//! normalized definition rather than by its name. Two objects with the same
//! definition hash are the same object; a differing name on an equal hash is
//! a rename, a differing hash is a semantic change.
//!
//! Normalization only removes cosmetic differences:
//! - whitespace runs collapse to a single space
//! - SQL outside quoted literals and quoted identifiers is lowercased
//! - parentheses wrapping the whole expression are removed
//! - redundant casts on literals (`'x'::text`, `0::integer`) are dropped from defaults

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const HASH_LEN: usize = 16;

/// Hash a canonical definition string.
pub fn content_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// Normalize a SQL expression fragment (check expression, index predicate, ...).
pub fn normalize_sql(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.trim().chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                if pending_space && needs_space(&out, c) {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
                // Copy the quoted section verbatim, honouring doubled quotes.
                while let Some(q) = chars.next() {
                    out.push(q);
                    if q == c {
                        if chars.peek() == Some(&c) {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                            continue;
                        }
                        break;
                    }
                }
            }
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_space && needs_space(&out, c) {
                    out.push(' ');
                }
                pending_space = false;
                out.extend(c.to_lowercase());
            }
        }
    }

    strip_outer_parens(&out).to_string()
}

/// Normalize a column default expression so equal defaults hash equally.
pub fn normalize_default(expr: &str) -> String {
    let mut current = normalize_sql(expr);
    loop {
        let Some(pos) = top_level_cast(&current) else {
            break;
        };
        let lhs = strip_outer_parens(current[..pos].trim());
        if is_literal(lhs) {
            current = lhs.to_string();
        } else {
            break;
        }
    }
    current
}

/// Normalize a column data type, folding common aliases onto their canonical names.
pub fn normalize_type(data_type: &str) -> String {
    let lowered = normalize_sql(data_type);
    let (base, suffix) = match lowered.find('(') {
        Some(idx) => (lowered[..idx].trim_end(), &lowered[idx..]),
        None => (lowered.as_str(), ""),
    };

    let base = match base {
        "int" | "int4" => "integer",
        "int8" => "bigint",
        "int2" => "smallint",
        "bool" => "boolean",
        "varchar" => "character varying",
        "char" | "bpchar" => "character",
        "float8" => "double precision",
        "float4" => "real",
        "decimal" => "numeric",
        "timestamptz" => "timestamp with time zone",
        "timestamp" => "timestamp without time zone",
        "timetz" => "time with time zone",
        other => other,
    };

    format!("{}{}", base, suffix)
}

/// Remove parentheses that wrap the entire expression.
fn strip_outer_parens(expr: &str) -> &str {
    let mut current = expr.trim();
    while current.starts_with('(') && current.ends_with(')') && wraps_whole(current) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

fn wraps_whole(expr: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let last = expr.len() - 1;

    for (idx, c) in expr.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && idx != last {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Byte position of the last `::` that is outside quotes and parentheses.
fn top_level_cast(expr: &str) -> Option<usize> {
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut found = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth -= 1,
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                found = Some(i);
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    found
}

fn is_literal(expr: &str) -> bool {
    let quoted = expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'');
    let numeric = !expr.is_empty()
        && expr
            .trim_start_matches('-')
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.');
    quoted || numeric || matches!(expr, "true" | "false" | "null")
}

/// Whitespace is insignificant after an opening paren, comma or colon and before
/// a closing paren, comma or colon.
fn needs_space(out: &str, next: char) -> bool {
    !out.is_empty()
        && !matches!(next, ')' | ',' | ':')
        && !out.ends_with(&['(', ',', ':'][..])
}
