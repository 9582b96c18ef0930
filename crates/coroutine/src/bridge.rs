use tracing::trace;

use crate::co::Resume;
use crate::error::{Error, Operation};
use crate::instance::{CoroutineInstance, State, YieldPoint};
use crate::Payload;

impl<T, E> CoroutineInstance<T, E>
where
    T: Payload,
    E: Payload,
{
    /// Resumes a suspended coroutine with the value its last suspension was waiting on,
    /// and runs it until it suspends again or terminates.
    ///
    /// # Errors
    /// Fails with [`Error::InvalidResumeState`] if the coroutine is not suspended.
    pub fn resume(&mut self, value: T) -> Result<YieldPoint<T, E>, Error<E>> {
        self.expect_state(Operation::Resume, State::Suspended)?;

        trace!(?value, "Resuming coroutine");

        Ok(self.step(Resume::Value(value)))
    }
}

#[cfg(test)]
mod tests {
    use crate::instance::Coroutine;
    use crate::yieldable::Yieldable;

    use super::*;

    fn doubler() -> CoroutineInstance<u32, ()> {
        CoroutineInstance::new(Coroutine::new(|co| async move {
            let a = co.value(0).await?;
            let b = co.value(a * 2).await?;
            Ok(a + b)
        }))
    }

    #[test]
    fn resume_feeds_values_in_order() {
        let mut instance = doubler();

        assert!(matches!(
            instance.start(),
            Ok(YieldPoint::Suspended(Yieldable::Immediate(0)))
        ));
        assert!(matches!(
            instance.resume(5),
            Ok(YieldPoint::Suspended(Yieldable::Immediate(10)))
        ));
        assert!(matches!(instance.resume(10), Ok(YieldPoint::Completed(15))));
        assert_eq!(instance.state(), State::Completed);
    }

    #[test]
    fn resume_before_start() {
        let mut instance = doubler();

        assert_eq!(
            instance.resume(1).unwrap_err(),
            Error::InvalidResumeState {
                operation: Operation::Resume,
                state: State::Created,
            }
        );
    }

    #[test]
    fn resume_after_completion() {
        let mut instance = doubler();
        let _ = instance.start();
        let _ = instance.resume(1);
        let _ = instance.resume(2);

        assert_eq!(
            instance.resume(3).unwrap_err(),
            Error::InvalidResumeState {
                operation: Operation::Resume,
                state: State::Completed,
            }
        );
        assert_eq!(instance.steps(), 3);
    }
}
