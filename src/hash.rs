use crate::bundle::BundleId;

/// A stable `uniqueKey` for a shared bundle: a deterministic fingerprint of
/// its sorted source-bundle ids.
///
/// The reference implementation uses MD5; we use `blake3` instead (see
/// DESIGN.md) — both are deterministic across runs, which is all §6
/// requires, but blake3 doesn't carry MD5's known collision weaknesses.
pub fn shared_bundle_key(source_bundles: &[BundleId]) -> String {
    let mut ids: Vec<usize> = source_bundles.iter().map(|b| b.0).collect();
    ids.sort_unstable();

    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|");

    let digest = blake3::hash(joined.as_bytes());
    digest.to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_regardless_of_input_order() {
        let a = shared_bundle_key(&[BundleId(3), BundleId(1), BundleId(2)]);
        let b = shared_bundle_key(&[BundleId(1), BundleId(2), BundleId(3)]);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_for_different_source_sets() {
        let a = shared_bundle_key(&[BundleId(1), BundleId(2)]);
        let b = shared_bundle_key(&[BundleId(1), BundleId(3)]);
        assert_ne!(a, b);
    }
}
