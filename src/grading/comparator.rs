use std::collections::BTreeMap;

use super::normalizer::{CanonicalEvent, Signature};

/// Outcome of one comparison, with the first reason for a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub pass: bool,
    pub reason: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Verdict {
            pass: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Verdict {
            pass: false,
            reason: Some(reason.into()),
        }
    }
}

fn group(events: &[CanonicalEvent]) -> BTreeMap<Signature, usize> {
    let mut groups = BTreeMap::new();
    for signature in events.iter().filter_map(CanonicalEvent::signature) {
        *groups.entry(signature).or_insert(0) += 1;
    }
    groups
}

fn delay_total(events: &[CanonicalEvent]) -> f64 {
    events.iter().filter_map(CanonicalEvent::delay_ms).sum()
}

/// Compare by meaning rather than order.
///
/// Every non-delay signature must occur exactly as often in `submitted` as in
/// `expected`, `submitted` may not introduce new signatures, and the summed
/// delays must agree within `tolerance_ms`. An empty `expected` accepts
/// anything.
pub fn compare(expected: &[CanonicalEvent], submitted: &[CanonicalEvent], tolerance_ms: f64) -> Verdict {
    if expected.is_empty() {
        return Verdict::pass();
    }
    if submitted.is_empty() {
        return Verdict::fail("no events were submitted");
    }

    let expected_groups = group(expected);
    let submitted_groups = group(submitted);

    for (signature, &want) in &expected_groups {
        let got = submitted_groups.get(signature).copied().unwrap_or(0);
        if got != want {
            return Verdict::fail(format!(
                "expected {} × {}, found {}",
                want, signature, got
            ));
        }
    }

    if let Some(extra) = submitted_groups
        .keys()
        .find(|signature| !expected_groups.contains_key(*signature))
    {
        return Verdict::fail(format!("unexpected event {}", extra));
    }

    let want = delay_total(expected);
    let got = delay_total(submitted);
    if (want - got).abs() > tolerance_ms {
        return Verdict::fail(format!(
            "total delay {} ms differs from expected {} ms",
            got, want
        ));
    }

    Verdict::pass()
}
