//! Chunk partitioner: greedy token-budgeted packing of ordered text units.
//!
//! Packs units left to right into the fewest newline-joined groups such that
//! `{preamble, group}` stays at or under the ceiling. Order is preserved;
//! contiguity in source order matters for diff readability, so no reordering.

use crate::token_count::{ChatMessage, TokenCounter};
use crate::{DigestError, DigestResult};

/// Cost of one request carrying `payload` under `preamble`.
fn request_cost(counter: &dyn TokenCounter, preamble: &str, payload: &str) -> usize {
    counter.count(&[ChatMessage::system(preamble), ChatMessage::user(payload)])
}

/// Greedy left-to-right packing.
///
/// Every unit that starts a group is checked for solo fit; a unit that
/// cannot fit under the ceiling even alone fails fast with `SizeExceeded`
/// instead of producing an oversized group. Units appended mid-group fit by
/// construction (the counter is monotonic in text length).
pub fn partition(
    units: &[String],
    preamble: &str,
    ceiling: usize,
    counter: &dyn TokenCounter,
) -> DigestResult<Vec<String>> {
    let mut groups: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for unit in units {
        match current.as_mut() {
            None => {
                check_solo_fit(counter, preamble, unit, ceiling)?;
                current = Some(unit.clone());
            }
            Some(group) => {
                let candidate = format!("{}\n{}", group, unit);
                if request_cost(counter, preamble, &candidate) <= ceiling {
                    *group = candidate;
                } else {
                    groups.push(current.take().expect("group in progress"));
                    check_solo_fit(counter, preamble, unit, ceiling)?;
                    current = Some(unit.clone());
                }
            }
        }
    }

    if let Some(last) = current {
        groups.push(last);
    }

    tracing::debug!(
        units = units.len(),
        groups = groups.len(),
        ceiling,
        "Partitioned units"
    );
    Ok(groups)
}

fn check_solo_fit(
    counter: &dyn TokenCounter,
    preamble: &str,
    unit: &str,
    ceiling: usize,
) -> DigestResult<()> {
    let cost = request_cost(counter, preamble, unit);
    if cost > ceiling {
        return Err(DigestError::SizeExceeded { cost, ceiling });
    }
    Ok(())
}
