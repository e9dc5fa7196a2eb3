//! Accumulating, non-fatal validation errors.
//!
//! A parse step that is merely a semantic validation (not a read failure)
//! never aborts. It records zero or more `(code, context)` pairs here and
//! always returns normally.

use std::fmt;

/// Extra information attached to a warning: which section, which directory
/// entry, which symbol name, or nothing at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorContext {
    None,
    Index(usize),
    Name(String),
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorContext::None => Ok(()),
            ErrorContext::Index(i) => write!(f, " (index {i})"),
            ErrorContext::Name(n) => write!(f, " ({n})"),
        }
    }
}

/// One recorded warning: a closed-taxonomy error code plus its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry<C> {
    pub code: C,
    pub context: ErrorContext,
}

impl<C: fmt::Display> fmt::Display for ErrorEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, self.context)
    }
}

/// An append-only bag of non-fatal validation warnings for one error code
/// type `C` (one per component: `DosHeaderErrc`, `SectionErrc`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList<C> {
    errors: Vec<ErrorEntry<C>>,
}

impl<C> ErrorList<C> {
    pub fn new() -> Self {
        ErrorList { errors: Vec::new() }
    }

    pub fn add_error(&mut self, code: C) {
        self.errors.push(ErrorEntry {
            code,
            context: ErrorContext::None,
        });
    }

    pub fn add_error_at(&mut self, code: C, index: usize) {
        self.errors.push(ErrorEntry {
            code,
            context: ErrorContext::Index(index),
        });
    }

    pub fn add_error_named(&mut self, code: C, name: impl Into<String>) {
        self.errors.push(ErrorEntry {
            code,
            context: ErrorContext::Name(name.into()),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ErrorEntry<C>] {
        &self.errors
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn extend(&mut self, other: ErrorList<C>) {
        self.errors.extend(other.errors);
    }
}

impl<C: PartialEq> ErrorList<C> {
    pub fn has_error(&self, code: &C) -> bool {
        self.errors.iter().any(|e| &e.code == code && e.context == ErrorContext::None)
    }

    pub fn has_any_error(&self, code: &C) -> bool {
        self.errors.iter().any(|e| &e.code == code)
    }
}

impl<C> IntoIterator for ErrorList<C> {
    type Item = ErrorEntry<C>;
    type IntoIter = std::vec::IntoIter<ErrorEntry<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
