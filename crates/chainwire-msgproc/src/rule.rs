//! Rule chains applied to incoming envelopes.

use chainwire_core::Envelope;
use tracing::debug;

use crate::error::Result;

/// A single check an envelope must pass before ordering.
pub trait Rule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, envelope: &Envelope) -> Result<()>;
}

/// Ordered rules, applied until the first failure.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; it runs after every rule already added.
    pub fn add(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.add(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order, stopping at the first error.
    pub fn apply(&self, envelope: &Envelope) -> Result<()> {
        for rule in &self.rules {
            if let Err(err) = rule.apply(envelope) {
                debug!(rule = rule.name(), error = %err, "envelope rejected");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        calls: Arc<AtomicUsize>,
        outcome: Option<RuleError>,
    }

    impl Rule for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn apply(&self, _envelope: &Envelope) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn test_empty_set_accepts() {
        assert!(RuleSet::new().apply(&Envelope::default()).is_ok());
    }

    #[test]
    fn test_short_circuits_on_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = |outcome| Counting {
            calls: Arc::clone(&calls),
            outcome,
        };
        let rules = RuleSet::new()
            .with(counting(None))
            .with(counting(Some(RuleError::EmptyMessage)))
            .with(counting(None));

        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules.apply(&Envelope::default()),
            Err(RuleError::EmptyMessage)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
