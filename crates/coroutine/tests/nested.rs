use pretty_assertions::assert_eq;

use coflow_config::RunnerConfig;
use coflow_coroutine::{Coroutine, Error, Runner};
use coflow_test::logging::init_logging;

fn doubled(value: u32) -> Coroutine<u32, String> {
    Coroutine::new(move |co| async move {
        let v = co.value(value).await?;
        Ok(v * 2)
    })
}

fn rejecting(reason: &'static str) -> Coroutine<u32, String> {
    Coroutine::new(move |co| async move {
        co.value(0).await?;
        Err(Error::Failed(reason.to_string()))
    })
}

fn endless(level: u32) -> Coroutine<u32, String> {
    Coroutine::new(move |co| async move { co.nested(endless(level + 1)).await })
}

#[tokio::test]
async fn nested_coroutine_result_resumes_parent() {
    init_logging();

    let runner = Runner::<u32, String>::new();

    let result = runner
        .run(Coroutine::new(|co| async move {
            let a = co.nested(doubled(2)).await?;
            let b = co.nested(doubled(a)).await?;
            Ok(a + b)
        }))
        .await;

    assert_eq!(result, Ok(12));
    assert_eq!(runner.metrics().runs_started.get(), 3);
}

#[tokio::test]
async fn nested_failure_is_thrown_into_parent() {
    let result = coflow_coroutine::run(|co| async move {
        match co.nested(rejecting("inner")).await {
            Err(Error::Failed(reason)) => co.nested(doubled(reason.len() as u32)).await,
            other => other,
        }
    })
    .await;

    assert_eq!(result, Ok(10));
}

#[tokio::test]
async fn nested_failure_escalates_through_every_level() {
    let result = coflow_coroutine::run(|co| async move {
        co.nested(Coroutine::new(|co| async move {
            co.nested(rejecting("deep")).await
        }))
        .await
    })
    .await;

    assert_eq!(result, Err(Error::Failed("deep".to_string())));
}

#[tokio::test]
async fn nesting_depth_is_bounded() {
    let config = RunnerConfig {
        max_nesting_depth: 4,
        ..Default::default()
    };

    let runner = Runner::builder().config(config).build();
    let result = runner.run(endless(0)).await;

    assert_eq!(result, Err(Error::NestingTooDeep { depth: 4 }));
    assert_eq!(runner.metrics().runs_started.get(), 5);
}

#[tokio::test]
async fn run_handle_composes_as_deferred() {
    let runner = Runner::<u32, String>::new();

    let inner = runner.run(doubled(10));
    let failing = runner.run(rejecting("no"));

    let result = runner
        .run(Coroutine::new(move |co| async move {
            let a = co.deferred(&inner.into_deferred()).await?;
            let b = co.deferred(&failing.into_deferred()).await.unwrap_or(1);
            Ok(a + b)
        }))
        .await;

    assert_eq!(result, Ok(21));
}
