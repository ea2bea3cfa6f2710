//! Signals exchanged across a source/sink edge.

use serde::{Deserialize, Serialize};

/// The event that ends a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terminal<E> {
    /// The stream completed normally.
    Finished,
    /// The stream failed with an error.
    Failed(E),
}

impl<E> Terminal<E> {
    /// Returns true for [`Terminal::Finished`].
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true for [`Terminal::Failed`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Finished => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// One observable step of a stream: the subscription handshake, a value,
/// or the terminal event.
///
/// Used both for scripting a [`ScriptedSource`](crate::lab::ScriptedSource)
/// and for the output captured by a
/// [`RecordingSink`](crate::lab::RecordingSink).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal<T, E> {
    /// The sink received its subscription handle.
    Subscription,
    /// A value.
    Value(T),
    /// The stream ended.
    Terminal(Terminal<E>),
}

impl<T, E> Signal<T, E> {
    /// Shorthand for `Signal::Terminal(Terminal::Finished)`.
    #[must_use]
    pub const fn finished() -> Self {
        Self::Terminal(Terminal::Finished)
    }

    /// Shorthand for `Signal::Terminal(Terminal::Failed(error))`.
    #[must_use]
    pub const fn failed(error: E) -> Self {
        Self::Terminal(Terminal::Failed(error))
    }

    /// Returns true for [`Signal::Subscription`].
    #[must_use]
    pub const fn is_subscription(&self) -> bool {
        matches!(self, Self::Subscription)
    }

    /// Returns true for [`Signal::Value`].
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true for [`Signal::Terminal`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Returns the carried value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the signal, returning the carried value, if any.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl<T, E> From<Terminal<E>> for Signal<T, E> {
    fn from(terminal: Terminal<E>) -> Self {
        Self::Terminal(terminal)
    }
}
