use std::time::Duration;

use imgvals_cli::cancel::{CancelHandle, CancelSignal};
use imgvals_cli::core::{FailureClass, classify};
use imgvals_cli::pipeline::get_service_values;
use imgvals_cli::test_utils::{FakeBuilder, FakeFailure, ManifestFixture};

use crate::common::Harness;

#[tokio::test]
async fn test_cancel_during_build_releases_workspace() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    harness.builder.fail_next(FakeFailure::Hang, 1).await;
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();
    let (handle, signal) = CancelHandle::new_pair();

    let run = get_service_values(&config, &manifest, &harness.infra, &harness.git, &signal);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.leftover_workspaces(), 1, "workspace exists while building");
        handle.cancel();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(run, canceller)
    })
    .await
    .expect("cancellation must not hang");

    let err = result.unwrap_err();
    assert_eq!(classify(&err), FailureClass::Cancelled);
    assert_eq!(harness.leftover_workspaces(), 0);
    assert_eq!(harness.git.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_before_start_does_nothing() {
    let harness = Harness::new(&ManifestFixture::single_image());
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();
    let (handle, signal) = CancelHandle::new_pair();
    handle.cancel();

    let err = get_service_values(&config, &manifest, &harness.infra, &harness.git, &signal)
        .await
        .unwrap_err();

    assert_eq!(classify(&err), FailureClass::Cancelled);
    assert_eq!(harness.builder.build_count(), 0);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_cancel_skips_further_attempts() {
    let builder = FakeBuilder::new().with_delay(Duration::from_millis(20));
    let harness = Harness::with_builder(&ManifestFixture::single_image(), builder);
    harness.builder.fail_next(FakeFailure::Infrastructure, 1).await;
    let mut config = harness.config();
    config.retry.initial_delay = Duration::from_secs(10);
    config.retry.max_delay = Duration::from_secs(10);
    let manifest = harness.project.manifest().unwrap();
    let (handle, signal) = CancelHandle::new_pair();

    let run = get_service_values(&config, &manifest, &harness.infra, &harness.git, &signal);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    };
    let (result, ()) = tokio::join!(run, canceller);

    assert_eq!(classify(&result.unwrap_err()), FailureClass::Cancelled);
    assert_eq!(harness.builder.build_count(), 1);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_never_signal_completes_normally() {
    let harness = Harness::new(&ManifestFixture::single_image());
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(harness.leftover_workspaces(), 0);
}
