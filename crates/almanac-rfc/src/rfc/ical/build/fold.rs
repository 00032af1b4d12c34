//! Content line folding (RFC 5545 §3.1).

/// Maximum physical line length in octets, excluding the CRLF.
const LINE_LIMIT: usize = 75;

/// Folds a content line so no physical line exceeds 75 octets.
///
/// Continuation lines begin with a single space, which counts towards the
/// limit. Multi-byte characters are never split.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= LINE_LIMIT {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + 3 * (line.len() / LINE_LIMIT + 1));
    let mut used = 0;
    for c in line.chars() {
        if used + c.len_utf8() > LINE_LIMIT {
            out.push_str("\r\n ");
            used = 1;
        }
        out.push(c);
        used += c.len_utf8();
    }
    out
}
