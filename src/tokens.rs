//! The shared, process-wide authorized-token set (§3 "Authorized-token set").
//!
//! One-time tokens are stored as a multiset (a token string can appear more
//! than once; one match consumes exactly one occurrence). The permanent
//! token, if any, is immutable and never removed.

use dashmap::DashMap;
use subtle::ConstantTimeEq;

/// The outcome of validating a client-presented `auth_token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The permanent token matched; nothing was consumed.
    Permanent,
    /// A one-time token matched and was removed.
    OneTime,
    /// No candidate token matched.
    Rejected,
}

/// Shared one-time-token multiset plus the optional permanent token.
///
/// Counts are stored rather than a plain `DashSet<String>` so that a token
/// value added twice (e.g. two independent provisioning calls for the same
/// string) is consumed independently, matching the Python original's
/// `list`-backed multiset semantics.
pub struct TokenStore {
    one_time: DashMap<String, usize>,
    permanent: Option<String>,
}

impl TokenStore {
    /// Creates a store seeded with `one_time` tokens and an optional
    /// `permanent` token.
    pub fn new<I>(one_time: I, permanent: Option<String>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let map = DashMap::new();
        for token in one_time {
            *map.entry(token).or_insert(0) += 1;
        }
        Self {
            one_time: map,
            permanent,
        }
    }

    /// Adds a one-time token to the set (the out-of-band mutation surface
    /// from §4.5/§6).
    pub fn insert(&self, token: impl Into<String>) {
        *self.one_time.entry(token.into()).or_insert(0) += 1;
    }

    /// Validates `candidate` against the permanent token (if configured)
    /// and every currently-held one-time token, using a constant-time
    /// comparison in every case so that the total number of comparisons
    /// performed does not depend on where in the set (or in the loop) a
    /// match occurs — satisfying I5.
    ///
    /// On a one-time match, exactly one occurrence of the matched token is
    /// removed before returning, atomically with respect to other callers.
    pub fn validate_and_consume(&self, candidate: &str) -> TokenOutcome {
        let candidate_bytes = candidate.as_bytes();

        let matches_permanent = self
            .permanent
            .as_deref()
            .map(|p| bool::from(p.as_bytes().ct_eq(candidate_bytes)))
            .unwrap_or(false);

        // Walk every one-time token unconditionally so the permanent-token
        // check above doesn't short-circuit the work a timing side-channel
        // could otherwise observe.
        let mut one_time_match: Option<String> = None;
        for entry in self.one_time.iter() {
            let is_match: bool = entry.key().as_bytes().ct_eq(candidate_bytes).into();
            if is_match && one_time_match.is_none() {
                one_time_match = Some(entry.key().clone());
            }
        }

        if matches_permanent {
            return TokenOutcome::Permanent;
        }

        if let Some(token) = one_time_match {
            self.remove_one(&token);
            return TokenOutcome::OneTime;
        }

        TokenOutcome::Rejected
    }

    /// Removes a single occurrence of `token`, atomically. Used internally
    /// by [`Self::validate_and_consume`]; exposed for tests that want to
    /// assert on the remaining multiset.
    fn remove_one(&self, token: &str) {
        let mut remove_entry = false;
        if let Some(mut count) = self.one_time.get_mut(token) {
            *count -= 1;
            remove_entry = *count == 0;
        }
        if remove_entry {
            self.one_time.remove(token);
        }
    }

    /// Total remaining one-time tokens (sum of per-value counts). Intended
    /// for tests asserting I1/I2/I3-adjacent postconditions.
    #[cfg(test)]
    pub fn remaining_one_time(&self) -> usize {
        self.one_time.iter().map(|e| *e.value()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_time_token_consumed_on_match() {
        let store = TokenStore::new(["T1".to_string()], None);
        assert_eq!(store.validate_and_consume("T1"), TokenOutcome::OneTime);
        assert_eq!(store.remaining_one_time(), 0);
        assert_eq!(store.validate_and_consume("T1"), TokenOutcome::Rejected);
    }

    #[test]
    fn permanent_token_never_consumed() {
        let store = TokenStore::new(Vec::new(), Some("P".to_string()));
        assert_eq!(store.validate_and_consume("P"), TokenOutcome::Permanent);
        assert_eq!(store.validate_and_consume("P"), TokenOutcome::Permanent);
        assert_eq!(store.remaining_one_time(), 0);
    }

    #[test]
    fn wrong_token_rejected_and_set_untouched() {
        let store = TokenStore::new(["T1".to_string()], None);
        assert_eq!(store.validate_and_consume("T2"), TokenOutcome::Rejected);
        assert_eq!(store.remaining_one_time(), 1);
    }

    #[test]
    fn duplicate_values_consumed_one_at_a_time() {
        let store = TokenStore::new(["DUP".to_string(), "DUP".to_string()], None);
        assert_eq!(store.remaining_one_time(), 2);
        assert_eq!(store.validate_and_consume("DUP"), TokenOutcome::OneTime);
        assert_eq!(store.remaining_one_time(), 1);
        assert_eq!(store.validate_and_consume("DUP"), TokenOutcome::OneTime);
        assert_eq!(store.remaining_one_time(), 0);
    }

    #[test]
    fn inserted_token_is_usable() {
        let store = TokenStore::new(Vec::new(), None);
        store.insert("FRESH");
        assert_eq!(store.validate_and_consume("FRESH"), TokenOutcome::OneTime);
    }
}
