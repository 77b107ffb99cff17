// Confirmation Gate
// Synchronous approval step for deletions

use std::collections::BTreeSet;

/// Decides which pending deletions may go ahead
///
/// Receives every path the plan would remove from the destination and
/// returns the approved subset. Anything not returned stays pending.
pub trait ConfirmationGate {
    fn approve(&self, pending: &[String]) -> BTreeSet<String>;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&[String]) -> BTreeSet<String>,
{
    fn approve(&self, pending: &[String]) -> BTreeSet<String> {
        self(pending)
    }
}

/// Approves nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ConfirmationGate for DenyAll {
    fn approve(&self, _pending: &[String]) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Approves exactly the paths given up front (e.g. `--delete` flags)
#[derive(Debug, Clone, Default)]
pub struct PreApproved {
    paths: BTreeSet<String>,
}

impl PreApproved {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl ConfirmationGate for PreApproved {
    fn approve(&self, pending: &[String]) -> BTreeSet<String> {
        pending
            .iter()
            .filter(|p| self.paths.contains(*p))
            .cloned()
            .collect()
    }
}
