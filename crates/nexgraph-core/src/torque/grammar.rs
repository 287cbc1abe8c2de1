//! Torque record grammars
//!
//! A DFT gauge emits each event in one of two shapes:
//!
//! - flat: `Tension + 12.5 N` (word, sign, magnitude, non-numeric unit)
//! - parenthesized: `(Peak, +, 12.5, N.m, 2024-03-01 10:15:02, extra)`
//!
//! Both predicates work on tokens rather than patterns so each rule can be
//! checked on its own. The flat grammar takes precedence.

/// Which grammar a line satisfies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `Tension + 12.5 N`
    Flat,
    /// `(Peak, -, 3.1, N.m)`, parentheses optional
    Parenthesized,
}

/// Classify a line, trying the flat grammar first
pub fn classify(line: &str) -> Option<Grammar> {
    if matches_flat_grammar(line) {
        Some(Grammar::Flat)
    } else if matches_paren_grammar(line) {
        Some(Grammar::Parenthesized)
    } else {
        None
    }
}

/// Space-separated `word sign magnitude unit...` on a single line
pub fn matches_flat_grammar(line: &str) -> bool {
    if is_multiline(line) {
        return false;
    }

    let tokens = flat_tokens(line);
    if tokens.len() < 4 {
        return false;
    }

    is_word(tokens[0])
        && is_sign(tokens[1])
        && is_magnitude(tokens[2])
        && tokens[3..]
            .iter()
            .all(|t| !t.chars().any(|c| c.is_ascii_digit()))
}

/// Comma-separated `label, sign, magnitude, description[, ...]`, parentheses optional
pub fn matches_paren_grammar(line: &str) -> bool {
    if is_multiline(line) || !line.contains(',') {
        return false;
    }

    let fields = paren_fields(line);
    fields.len() >= 4
        && !fields[0].is_empty()
        && is_sign(fields[1])
        && is_magnitude(fields[2])
        && !fields[3].is_empty()
}

/// Whitespace tokens of a flat record
pub fn flat_tokens(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Trimmed comma fields of a parenthesized record, parentheses removed
pub fn paren_fields(line: &str) -> Vec<&str> {
    let inner = line.trim();
    let inner = inner.strip_prefix('(').unwrap_or(inner);
    let inner = inner.strip_suffix(')').unwrap_or(inner);
    inner.split(',').map(str::trim).collect()
}

fn is_multiline(line: &str) -> bool {
    line.contains('\n') || line.contains('\r')
}

fn is_word(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_sign(token: &str) -> bool {
    token == "+" || token == "-"
}

// Digits and dots only; whether it is a valid number is decided when converting
fn is_magnitude(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}
