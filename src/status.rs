//! Status comparison
//!
//! Status is only written when the observed facts differ from what the
//! resource already records, so a converged resource sees no status writes.

use std::collections::BTreeMap;

/// Returns true if the observed member list differs from the stored one
///
/// The comparison is order-sensitive: the same pods listed in a different
/// order count as a change.
pub fn members_changed(stored: &[String], observed: &[String]) -> bool {
    stored != observed
}

/// Returns true if the observed address map differs from the stored one
pub fn addresses_changed(
    stored: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> bool {
    stored != observed
}

/// Returns true if observed addresses should be written to the status
///
/// Published addresses are never replaced: only an empty stored map takes a
/// write, and only when the observation actually differs from it.
pub fn should_publish_addresses(
    stored: &BTreeMap<String, String>,
    observed: &BTreeMap<String, String>,
) -> bool {
    stored.is_empty() && addresses_changed(stored, observed)
}
