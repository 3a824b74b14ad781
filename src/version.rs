use std::cmp::Ordering;

/// Simple semver-ish comparison of dot-separated version strings. Components
/// compare numerically when both sides parse as integers, byte-lexically
/// otherwise (missing components treated as 0).
pub(crate) fn compare(a: &str, b: &str) -> Ordering {
    let mut ai = a.split('.');
    let mut bi = b.split('.');
    loop {
        let (av, bv) = match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (av, bv) => (av.unwrap_or("0"), bv.unwrap_or("0")),
        };
        match component_cmp(av, bv) {
            Ordering::Equal => {}
            other => return other,
        }
    }
}

fn component_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(an), Ok(bn)) => an.cmp(&bn),
        _ => a.cmp(b),
    }
}
