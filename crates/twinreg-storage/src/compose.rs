//! Decorator composition over the registry contract.
//!
//! A registry is assembled as a base backend wrapped by an ordered list of
//! [`Decorator`]s. Each decorator implements the full contract and delegates
//! whatever it does not handle to the registry it wraps, so cross-cutting
//! behavior ([`eventing`](crate::eventing), [`authorization`](crate::authorization))
//! stays out of the backends.

use std::fmt;
use std::sync::Arc;

/// Kind of access a registry call needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Write => write!(f, "write"),
        }
    }
}

/// Wraps a component in another implementation of the same interface.
pub trait Decorator<T: ?Sized>: Send + Sync {
    fn decorate(&self, inner: Arc<T>) -> Arc<T>;
}

/// Applies `decorators` to `base` in order; the last one ends up outermost.
pub fn compose<T: ?Sized>(base: Arc<T>, decorators: &[Box<dyn Decorator<T>>]) -> Arc<T> {
    decorators
        .iter()
        .fold(base, |inner, decorator| decorator.decorate(inner))
}
