use tracing::{debug, trace};

use crate::co::Resume;
use crate::error::{Error, Operation};
use crate::instance::{CoroutineInstance, State, YieldPoint};
use crate::Payload;

impl<T, E> CoroutineInstance<T, E>
where
    T: Payload,
    E: Payload,
{
    /// Throws an error into a suspended coroutine, at the point where it suspended.
    ///
    /// If the coroutine recovers, the result is its next suspension or its return value.
    /// Otherwise the error escapes the body and the result is [`YieldPoint::Failed`].
    ///
    /// # Errors
    /// Fails with [`Error::InvalidResumeState`] if the coroutine is not suspended.
    pub fn throw_into(&mut self, error: Error<E>) -> Result<YieldPoint<T, E>, Error<E>> {
        self.expect_state(Operation::Throw, State::Suspended)?;

        trace!(%error, "Throwing error into coroutine");

        let point = self.step(Resume::Error(error));

        match &point {
            YieldPoint::Failed(error) => debug!(%error, "Coroutine did not recover"),
            _ => debug!("Coroutine recovered"),
        }

        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use crate::instance::Coroutine;

    use super::*;

    #[test]
    fn recovers() {
        let mut instance = CoroutineInstance::new(Coroutine::<String, String>::new(|co| async move {
            match co.value("first".to_string()).await {
                Ok(value) => Ok(value),
                Err(Error::Failed(reason)) => Ok(format!("recovered from {reason}")),
                Err(other) => Err(other),
            }
        }));

        let _ = instance.start();
        let point = instance.throw_into(Error::Failed("boom".to_string()));

        assert!(matches!(
            point,
            Ok(YieldPoint::Completed(ref s)) if s == "recovered from boom"
        ));
    }

    #[test]
    fn escalates() {
        let mut instance = CoroutineInstance::new(Coroutine::<u32, &'static str>::new(|co| async move {
            let v = co.value(1).await?;
            Ok(v)
        }));

        let _ = instance.start();
        let point = instance.throw_into(Error::Failed("boom"));

        assert!(matches!(point, Ok(YieldPoint::Failed(Error::Failed("boom")))));
        assert_eq!(instance.state(), State::Failed);
    }

    #[test]
    fn throw_into_terminated() {
        let mut instance =
            CoroutineInstance::new(Coroutine::<u32, ()>::new(|_co| async move { Ok(1) }));

        let _ = instance.start();

        assert_eq!(
            instance.throw_into(Error::Cancelled).unwrap_err(),
            Error::InvalidResumeState {
                operation: Operation::Throw,
                state: State::Completed,
            }
        );
    }
}
