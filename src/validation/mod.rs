//! Streaming validation of writer output.
//!
//! Validators observe the writer's event stream (element start, attributes,
//! start-tag completion, text, element end, document end) and report
//! problems into a [`ProblemReport`]. They never touch the output; the writer
//! decides what a problem means:
//!
//! - with a [`ProblemHandler`] installed, every problem goes to the handler;
//! - otherwise `Error` and `Fatal` problems abort the call with
//!   [`WriteError::Validation`](crate::error::WriteError::Validation), and
//!   warnings are logged.
//!
//! Several validators can be attached at once. A [`ValidatorChain`] runs
//! them in attachment order and stops dispatching an event as soon as one of
//! them reports a fatal problem. The content class the writer enforces is
//! the most restrictive one any validator returns.
//!
//! # Architecture
//!
//! - Common types ([`Validator`], [`ContentClass`], [`ProblemReport`],
//!   [`ValidatorChain`], [`ProblemHandler`])
//! - DTD validation (`dtd` submodule): a DTD subset model and a validator
//!   built on it

pub mod dtd;

use std::fmt;

use crate::error::{ErrorSeverity, Result, ValidationProblem};
use crate::namespace::ExpandedName;

/// What kind of character content the innermost open element accepts.
///
/// Ordered from most to least restrictive, so the effective class of a
/// validator chain is the minimum of its members.
///
/// # Examples
///
/// ```
/// use xmlcursor::validation::ContentClass;
///
/// assert!(ContentClass::None < ContentClass::WhitespaceOnly);
/// assert_eq!(
///     ContentClass::AnyText.min(ContentClass::ValidatableText),
///     ContentClass::ValidatableText
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentClass {
    /// No character content at all (declared EMPTY).
    None,
    /// Only whitespace (element-only content).
    WhitespaceOnly,
    /// Text that must be handed to the validators.
    ValidatableText,
    /// Anything goes.
    AnyText,
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no content"),
            Self::WhitespaceOnly => write!(f, "whitespace only"),
            Self::ValidatableText => write!(f, "validatable text"),
            Self::AnyText => write!(f, "any text"),
        }
    }
}

/// Collector for problems reported during one dispatched event.
#[derive(Debug, Clone, Default)]
pub struct ProblemReport {
    problems: Vec<ValidationProblem>,
}

impl ProblemReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a problem.
    pub fn push(&mut self, problem: ValidationProblem) {
        self.problems.push(problem);
    }

    /// Records a problem built from a severity and a message.
    pub fn report(&mut self, severity: ErrorSeverity, message: impl Into<String>) {
        self.push(ValidationProblem::new(severity, message));
    }

    /// Records an `Error`-severity problem.
    pub fn error(&mut self, message: impl Into<String>) {
        self.report(ErrorSeverity::Error, message);
    }

    /// Returns `true` if a fatal problem has been recorded.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.problems
            .iter()
            .any(|p| p.severity == ErrorSeverity::Fatal)
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// The recorded problems, in report order.
    #[must_use]
    pub fn problems(&self) -> &[ValidationProblem] {
        &self.problems
    }

    /// Removes and returns all recorded problems.
    pub fn take(&mut self) -> Vec<ValidationProblem> {
        std::mem::take(&mut self.problems)
    }
}

/// A streaming validator.
///
/// Names passed in are the namespace-resolved names the writer emits.
/// `validate_element_and_attributes` is called once the start tag is
/// complete and returns the content class of the new element;
/// `validate_element_end` returns the content class of the parent.
pub trait Validator {
    /// Identifies the validator for [`ValidatorChain::remove`].
    fn name(&self) -> &str;

    /// An element start tag is being written.
    fn validate_element_start(&mut self, name: &ExpandedName<'_>, report: &mut ProblemReport);

    /// An attribute is being written on the open start tag.
    fn validate_attribute(
        &mut self,
        name: &ExpandedName<'_>,
        value: &str,
        report: &mut ProblemReport,
    );

    /// The start tag is complete.
    fn validate_element_and_attributes(&mut self, report: &mut ProblemReport) -> ContentClass;

    /// An element is being closed.
    fn validate_element_end(
        &mut self,
        name: &ExpandedName<'_>,
        report: &mut ProblemReport,
    ) -> ContentClass;

    /// Character content inside an element whose class is
    /// [`ContentClass::ValidatableText`]. `is_final` is set for typed
    /// writes, which always carry the element's complete value.
    fn validate_text(&mut self, text: &str, is_final: bool, report: &mut ProblemReport);

    /// A general entity reference is being written.
    fn validate_entity_ref(&mut self, _name: &str, _report: &mut ProblemReport) {}

    /// The document is finished, or the validator is being detached.
    fn validation_completed(&mut self, report: &mut ProblemReport);
}

/// Receives every validation problem in place of the default handling.
///
/// Returning an error aborts the writer call with that error.
pub trait ProblemHandler {
    /// Handles one problem.
    ///
    /// # Errors
    ///
    /// Any error returned is propagated out of the writer call.
    fn handle_problem(&mut self, problem: &ValidationProblem) -> Result<()>;
}

impl<F> ProblemHandler for F
where
    F: FnMut(&ValidationProblem) -> Result<()>,
{
    fn handle_problem(&mut self, problem: &ValidationProblem) -> Result<()> {
        self(problem)
    }
}

/// Validators attached to one writer, in attachment order.
#[derive(Default)]
pub struct ValidatorChain {
    validators: Vec<Box<dyn Validator>>,
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}

impl ValidatorChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a validator.
    pub fn push(&mut self, validator: Box<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Detaches the first validator called `name`.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Validator>> {
        let index = self.validators.iter().position(|v| v.name() == name)?;
        Some(self.validators.remove(index))
    }

    /// Detaches every validator.
    pub fn clear(&mut self) -> Vec<Box<dyn Validator>> {
        std::mem::take(&mut self.validators)
    }

    /// Number of attached validators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Returns `true` if no validator is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    fn each(
        &mut self,
        report: &mut ProblemReport,
        mut f: impl FnMut(&mut dyn Validator, &mut ProblemReport),
    ) {
        for validator in &mut self.validators {
            f(validator.as_mut(), report);
            if report.has_fatal() {
                break;
            }
        }
    }

    fn each_class(
        &mut self,
        report: &mut ProblemReport,
        mut f: impl FnMut(&mut dyn Validator, &mut ProblemReport) -> ContentClass,
    ) -> ContentClass {
        let mut class = ContentClass::AnyText;
        self.each(report, |v, r| class = class.min(f(v, r)));
        class
    }

    /// Dispatches [`Validator::validate_element_start`].
    pub fn element_start(&mut self, name: &ExpandedName<'_>, report: &mut ProblemReport) {
        self.each(report, |v, r| v.validate_element_start(name, r));
    }

    /// Dispatches [`Validator::validate_attribute`].
    pub fn attribute(&mut self, name: &ExpandedName<'_>, value: &str, report: &mut ProblemReport) {
        self.each(report, |v, r| v.validate_attribute(name, value, r));
    }

    /// Dispatches [`Validator::validate_element_and_attributes`] and
    /// combines the results.
    pub fn element_and_attributes(&mut self, report: &mut ProblemReport) -> ContentClass {
        self.each_class(report, |v, r| v.validate_element_and_attributes(r))
    }

    /// Dispatches [`Validator::validate_element_end`] and combines the
    /// results.
    pub fn element_end(&mut self, name: &ExpandedName<'_>, report: &mut ProblemReport) -> ContentClass {
        self.each_class(report, |v, r| v.validate_element_end(name, r))
    }

    /// Dispatches [`Validator::validate_text`].
    pub fn text(&mut self, text: &str, is_final: bool, report: &mut ProblemReport) {
        self.each(report, |v, r| v.validate_text(text, is_final, r));
    }

    /// Dispatches [`Validator::validate_entity_ref`].
    pub fn entity_ref(&mut self, name: &str, report: &mut ProblemReport) {
        self.each(report, |v, r| v.validate_entity_ref(name, r));
    }

    /// Dispatches [`Validator::validation_completed`].
    pub fn completed(&mut self, report: &mut ProblemReport) {
        self.each(report, |v, r| v.validation_completed(r));
    }
}
