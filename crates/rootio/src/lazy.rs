//! Explicitly lazy values.
//!
//! A [`Lazy`] starts as an unevaluated thunk and is resolved through a single
//! accessor, [`Lazy::get`]. A failed evaluation leaves it unevaluated so that a
//! later call can retry.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;

type Thunk<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

enum State<T> {
    Unevaluated(Thunk<T>),
    Evaluated(Arc<T>),
}

/// `Unevaluated(thunk) | Evaluated(value)`.
pub struct Lazy<T> {
    state: Mutex<State<T>>,
}

impl<T> Lazy<T> {
    /// Wrap a computation.
    pub fn new(thunk: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self { state: Mutex::new(State::Unevaluated(Box::new(thunk))) }
    }

    /// An already evaluated value.
    pub fn evaluated(value: T) -> Self {
        Self { state: Mutex::new(State::Evaluated(Arc::new(value))) }
    }

    /// Evaluate on first use and return the value.
    ///
    /// Concurrent callers block until the first evaluation finishes.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match &*state {
            State::Evaluated(v) => return Ok(Arc::clone(v)),
            State::Unevaluated(thunk) => Arc::new(thunk()?),
        };
        *state = State::Evaluated(Arc::clone(&value));
        Ok(value)
    }

    /// Whether the value has been computed.
    pub fn is_evaluated(&self) -> bool {
        matches!(*self.state.lock().unwrap_or_else(PoisonError::into_inner), State::Evaluated(_))
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.is_evaluated() { "Evaluated" } else { "Unevaluated" };
        f.debug_tuple("Lazy").field(&label).finish()
    }
}
