//! Composable validators.
//!
//! # Responsibility
//! - Compose ordered atomic checks into one labelled validator.
//! - Report expected failures as [`Verdict::Fail`] values.
//!
//! # Invariants
//! - Composition is fail-fast: checks after the first failure never run.
//! - Only uninterpretable input yields `Err(MalformedInputError)`.

pub mod checks;

use crate::error::{MalformedInputError, ValidationFailure};

pub use checks::{ExtensionCheck, RequiredColumnsCheck, UniqueIdCheck};

/// Outcome of one check or one composed validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(ValidationFailure),
}

impl Verdict {
    pub fn fail(origin: &str, message: impl Into<String>) -> Self {
        Self::Fail(ValidationFailure::new(origin, message))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Converts to a `Result` for `?` propagation in pipeline code.
    pub fn into_result(self) -> Result<(), ValidationFailure> {
        match self {
            Self::Pass => Ok(()),
            Self::Fail(failure) => Err(failure),
        }
    }
}

pub type CheckResult = Result<Verdict, MalformedInputError>;

/// One atomic check. Parameters live in the implementing value; the source
/// label is supplied by the composing validator.
pub trait Check<T: ?Sized>: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, input: &T, label: &str) -> CheckResult;
}

/// Adapts a closure into a [`Check`].
pub struct FnCheck<F> {
    name: &'static str,
    func: F,
}

impl<T: ?Sized, F> Check<T> for FnCheck<F>
where
    F: Fn(&T, &str) -> CheckResult + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, input: &T, label: &str) -> CheckResult {
        (self.func)(input, label)
    }
}

/// Wraps an ad-hoc check function.
pub fn check_fn<T: ?Sized, F>(name: &'static str, func: F) -> FnCheck<F>
where
    F: Fn(&T, &str) -> CheckResult + Send + Sync,
{
    FnCheck { name, func }
}

/// Ordered, labelled sequence of checks run fail-fast.
pub struct Validator<T: ?Sized> {
    label: String,
    checks: Vec<Box<dyn Check<T>>>,
}

impl<T: ?Sized> Validator<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            checks: Vec::new(),
        }
    }

    /// Appends one check; checks run in insertion order.
    pub fn with_check(mut self, check: impl Check<T> + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs checks in order and stops at the first failure.
    pub fn validate(&self, input: &T) -> CheckResult {
        for check in &self.checks {
            let verdict = check.check(input, &self.label)?;
            if let Verdict::Fail(failure) = verdict {
                log::debug!(
                    "event=validate module=validate status=fail source={} check={}",
                    self.label,
                    check.name()
                );
                return Ok(Verdict::Fail(failure));
            }
        }
        Ok(Verdict::Pass)
    }
}

impl<T: ?Sized> std::fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("label", &self.label)
            .field("checks", &self.check_names())
            .finish()
    }
}

/// Composes `checks` into one validator labelled with `label`.
pub fn compose<T: ?Sized>(label: impl Into<String>, checks: Vec<Box<dyn Check<T>>>) -> Validator<T> {
    Validator {
        label: label.into(),
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::{check_fn, compose, Check, CheckResult, Validator, Verdict};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: Arc<AtomicUsize>, pass: bool) -> impl Check<str> {
        check_fn("counting", move |_input: &str, label: &str| -> CheckResult {
            counter.fetch_add(1, Ordering::SeqCst);
            if pass {
                Ok(Verdict::Pass)
            } else {
                Ok(Verdict::fail(label, format!("{label}: rejected")))
            }
        })
    }

    #[test]
    fn stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let validator: Validator<str> = Validator::new("AEA")
            .with_check(counting(calls.clone(), true))
            .with_check(counting(calls.clone(), false))
            .with_check(counting(calls.clone(), true));

        let verdict = validator.validate("input").expect("checks never error");
        match verdict {
            Verdict::Fail(failure) => {
                assert_eq!(failure.origin, "AEA");
                assert_eq!(failure.message, "AEA: rejected");
            }
            Verdict::Pass => panic!("second check must fail"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_validator_passes() {
        let validator = compose::<str>("EJM", Vec::new());
        assert!(validator.is_empty());
        assert!(validator.validate("anything").unwrap().is_pass());
    }

    #[test]
    fn compose_keeps_check_order() {
        let validator = compose::<str>(
            "AJO",
            vec![
                Box::new(check_fn("first", |_: &str, _: &str| Ok(Verdict::Pass))),
                Box::new(check_fn("second", |_: &str, _: &str| Ok(Verdict::Pass))),
            ],
        );
        assert_eq!(validator.check_names(), vec!["first", "second"]);
        assert_eq!(validator.label(), "AJO");
    }
}
