//! Reversible operations.
//!
//! An operation maps an object forward and back. `backward` must exactly undo
//! the effect `forward` had on the object; anything it touches outside the
//! object has to be a side channel the operation owns (a file, a relation).

use crate::transaction::error::TransactionResult;

/// An atomic forward/backward state change applied to one object.
pub trait Operation<T> {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Apply the change.
    fn forward(&mut self, obj: T) -> TransactionResult<T>;

    /// Undo the change made by [`Operation::forward`].
    fn backward(&mut self, obj: T) -> TransactionResult<T>;
}

type StepFn<'a, T> = Box<dyn FnMut(T) -> TransactionResult<T> + 'a>;

/// An [`Operation`] built from a pair of closures.
pub struct FnOperation<'a, T> {
    name: String,
    forward: StepFn<'a, T>,
    backward: StepFn<'a, T>,
}

impl<'a, T> FnOperation<'a, T> {
    /// Create an operation from its forward and backward closures.
    pub fn new<F, B>(name: impl Into<String>, forward: F, backward: B) -> Self
    where
        F: FnMut(T) -> TransactionResult<T> + 'a,
        B: FnMut(T) -> TransactionResult<T> + 'a,
    {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            backward: Box::new(backward),
        }
    }
}

impl<T> Operation<T> for FnOperation<'_, T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&mut self, obj: T) -> TransactionResult<T> {
        (self.forward)(obj)
    }

    fn backward(&mut self, obj: T) -> TransactionResult<T> {
        (self.backward)(obj)
    }
}

/// Shorthand for [`FnOperation::new`].
pub fn operation<'a, T, F, B>(name: impl Into<String>, forward: F, backward: B) -> FnOperation<'a, T>
where
    F: FnMut(T) -> TransactionResult<T> + 'a,
    B: FnMut(T) -> TransactionResult<T> + 'a,
{
    FnOperation::new(name, forward, backward)
}
