//! Premium entitlement seam.

use tokio::sync::watch;

/// Source of the premium flag. Observed, never owned, by the core.
pub trait Entitlements: Send + Sync {
    fn is_premium(&self) -> bool;
}

/// Entitlement flag held in memory and settable at runtime.
#[derive(Debug)]
pub struct StaticEntitlements {
    premium: watch::Sender<bool>,
}

impl StaticEntitlements {
    pub fn new(premium: bool) -> Self {
        let (premium, _) = watch::channel(premium);
        Self { premium }
    }

    pub fn set_premium(&self, premium: bool) {
        let changed = self.premium.send_if_modified(|current| {
            let changed = *current != premium;
            *current = premium;
            changed
        });
        if changed {
            tracing::info!(premium, "entitlement changed");
        }
    }

    /// Observe changes to the premium flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.premium.subscribe()
    }
}

impl Default for StaticEntitlements {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Entitlements for StaticEntitlements {
    fn is_premium(&self) -> bool {
        *self.premium.borrow()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn flag_changes_are_observable() {
        let entitlements = StaticEntitlements::default();
        let mut rx = entitlements.subscribe();
        assert!(!entitlements.is_premium());

        entitlements.set_premium(true);
        assert!(entitlements.is_premium());
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        entitlements.set_premium(true);
        assert!(!rx.has_changed().unwrap());
    }
}
