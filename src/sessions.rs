// Session filter parsing for `--sessions`.
//
// Accepted tokens:
// - a bare id such as `01`, kept verbatim (padding included);
// - an inclusive range such as `00-10`, expanded with every value padded to
//   the wider of the two endpoints (`5-15` -> `05`..`15`).
//
// A range whose start is greater than its end expands to nothing. Anything
// else (extra hyphens, empty halves, non-digits) is rejected, as is a range
// spanning more than `MAX_RANGE_IDS` ids.

use crate::error::SessionTokenError;
use std::collections::BTreeSet;

/// Largest number of ids a single range may expand to.
pub const MAX_RANGE_IDS: u64 = 1_000_000;

/// Expand one token into the session ids it denotes.
pub fn parse_session_token(token: &str) -> Result<Vec<String>, SessionTokenError> {
    let invalid = |reason| SessionTokenError {
        token: token.to_string(),
        reason,
    };

    let parts: Vec<&str> = token.split('-').collect();
    match parts.as_slice() {
        [id] => {
            if !is_digits(id) {
                return Err(invalid("expected digits"));
            }
            Ok(vec![id.to_string()])
        }
        [start, end] => {
            if !is_digits(start) || !is_digits(end) {
                return Err(invalid("range bounds must be digits"));
            }
            let width = start.len().max(end.len());
            let lo: u64 = start.parse().map_err(|_| invalid("number out of range"))?;
            let hi: u64 = end.parse().map_err(|_| invalid("number out of range"))?;
            if lo > hi {
                tracing::debug!("Descending session range {token:?} selects no sessions");
                return Ok(Vec::new());
            }
            if hi - lo >= MAX_RANGE_IDS {
                return Err(invalid("range too large"));
            }
            Ok((lo..=hi).map(|n| format!("{n:0width$}")).collect())
        }
        _ => Err(invalid("more than one hyphen")),
    }
}

/// Union of every token's ids. Duplicates collapse; iteration is sorted.
pub fn parse_sessions<I, S>(tokens: I) -> Result<BTreeSet<String>, SessionTokenError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = BTreeSet::new();
    for token in tokens {
        result.extend(parse_session_token(token.as_ref())?);
    }
    Ok(result)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
