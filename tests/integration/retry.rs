use imgvals_cli::build::RetryPolicy;
use imgvals_cli::cancel::CancelSignal;
use imgvals_cli::core::{FailureClass, ValuesError, classify, find_values_error};
use imgvals_cli::pipeline::get_service_values;
use imgvals_cli::test_utils::{FakeFailure, ManifestFixture};

use crate::common::Harness;

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let harness = Harness::new(&ManifestFixture::single_image());
    harness.builder.fail_next(FakeFailure::Infrastructure, 5).await;
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    let err =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap_err();

    assert!(matches!(find_values_error(&err), Some(ValuesError::RegistryUnavailable { .. })));
    assert_eq!(classify(&err), FailureClass::Retryable);
    assert_eq!(harness.builder.build_count(), 3);
    assert_eq!(harness.storage.commit_count(), 0);
    assert_eq!(harness.git.call_count(), 0);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_attempt_limit_is_configurable() {
    let harness = Harness::new(&ManifestFixture::single_image());
    harness.builder.fail_next(FakeFailure::Infrastructure, 10).await;
    let mut config = harness.config();
    config.retry = RetryPolicy::immediate(5);
    let manifest = harness.project.manifest().unwrap();

    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap_err();
    assert_eq!(harness.builder.build_count(), 5);
}

#[tokio::test]
async fn test_recovers_from_transient_failure() {
    let harness = Harness::new(&ManifestFixture::single_image());
    harness.builder.fail_next(FakeFailure::Infrastructure, 2).await;
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(harness.builder.build_count(), 3);
    assert_eq!(harness.storage.commit_count(), 1);
    assert!(doc.images.contains_key("web"));
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_lock_contention_is_retried() {
    let harness = Harness::new(&ManifestFixture::single_image());
    harness.storage.fail_next_locks(1);
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(harness.storage.lock_count(), 2);
    assert_eq!(harness.builder.build_count(), 1);
}

#[tokio::test]
async fn test_build_failure_is_not_retried() {
    let harness = Harness::new(&ManifestFixture::single_image());
    harness.builder.fail_next(FakeFailure::BuildLogic, 1).await;
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    let err =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap_err();

    assert!(matches!(find_values_error(&err), Some(ValuesError::BuildFailed { .. })));
    assert_eq!(classify(&err), FailureClass::Fatal);
    assert!(format!("{err:#}").contains("image 'web'"));
    assert_eq!(harness.builder.build_count(), 1);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_retry_does_not_rebuild_committed_images() {
    let harness = Harness::new(&ManifestFixture::with_base_image());
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(harness.builder.build_count(), 3);

    // Only web changes; its transient failure must not rebuild base or worker
    harness.project.write("web/app.js", "console.log('v2')\n").unwrap();
    harness.builder.fail_next(FakeFailure::Infrastructure, 1).await;
    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();

    let rebuilt: Vec<String> = harness.builder.requests().await[3..]
        .iter()
        .map(|request| request.image.clone())
        .collect();
    assert_eq!(rebuilt, vec!["web", "web"]);
}
