use imgvals_cli::build::{BuildDecision, BuildNecessityEvaluator};
use imgvals_cli::cancel::CancelSignal;
use imgvals_cli::core::{ValuesError, find_values_error};
use imgvals_cli::fingerprint::FingerprintCalculator;
use imgvals_cli::images::ImagesToProcess;
use imgvals_cli::pipeline::get_service_values;
use imgvals_cli::test_utils::ManifestFixture;

use crate::common::{Harness, REPO};

#[tokio::test]
async fn test_up_to_date_images_are_reported_without_building() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let config = harness.config();
    harness.storage.preload(&harness.fingerprint(&config, "web").await, "web-cached");
    harness.storage.preload(&harness.fingerprint(&config, "worker").await, "worker-cached");
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(doc.images.keys().collect::<Vec<_>>(), vec!["web", "worker"]);
    assert_eq!(doc.images["web"].tag, "web-cached");
    assert_eq!(doc.images["worker"].tag, "worker-cached");
    assert_eq!(doc.images["web"].repository, REPO);
    assert_eq!(doc.images["web"].image, format!("{REPO}:web-cached"));
    assert!(doc.images["web"].digest.is_some());
    assert_eq!(harness.builder.build_count(), 0);
    assert_eq!(harness.storage.commit_count(), 0);
    assert_eq!(harness.storage.lock_count(), 0);
}

#[tokio::test]
async fn test_cache_miss_builds_once_and_reports_new_tag() {
    let harness = Harness::new(&ManifestFixture::single_image());
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(harness.builder.build_count(), 1);
    let requests = harness.builder.requests().await;
    let web = &doc.images["web"];
    assert_eq!(web.tag, requests[0].tag);
    assert_eq!(web.repository, REPO);
    assert!(web.tag.starts_with(harness.fingerprint(&config, "web").await.short(32)));
    assert!(web.digest.as_deref().is_some_and(|d| d.starts_with("sha256:")));

    assert_eq!(doc.project, "demo");
    assert_eq!(doc.namespace, "demo");
    assert_eq!(doc.env, "");
    assert_eq!(doc.repo.as_deref(), Some(REPO));
    assert_eq!(doc.commit_hash, harness.git.hash());
    assert_eq!(doc.commit_timestamp, 1_700_000_000);
}

#[tokio::test]
async fn test_stub_mode_uses_placeholders_and_no_infrastructure() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let mut config = harness.config();
    config.stub_tags = true;
    harness.storage.preload(&harness.fingerprint(&config, "web").await, "web-cached");
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    for image in doc.images.values() {
        assert_eq!(image.repository, "stub/repository");
        assert_eq!(image.tag, "TAG");
        assert!(image.digest.is_none());
    }
    assert_eq!(doc.images.len(), 2);
    assert_eq!(doc.repo.as_deref(), Some("stub/repository"));
    assert_eq!(harness.infra.request_count(), 0);
    assert_eq!(harness.storage.total_calls(), 0);
    assert_eq!(harness.builder.build_count(), 0);
}

#[tokio::test]
async fn test_unknown_image_fails_before_cache_access() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let mut config = harness.config();
    config.images = ImagesToProcess::Only(vec!["web".to_string(), "missing".to_string()]);
    let manifest = harness.project.manifest().unwrap();

    let err =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap_err();

    assert!(matches!(
        find_values_error(&err),
        Some(ValuesError::ImageNotFound { name }) if name == "missing"
    ));
    assert_eq!(harness.storage.lock_count(), 0);
    assert_eq!(harness.storage.total_calls(), 0);
    assert_eq!(harness.infra.request_count(), 0);
    assert_eq!(harness.git.call_count(), 0);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_images_are_up_to_date_after_successful_run() {
    let harness = Harness::new(&ManifestFixture::with_base_image());
    let config = harness.config();
    let manifest = harness.project.manifest().unwrap();

    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(harness.builder.build_count(), 3);

    let fingerprints =
        FingerprintCalculator::new(&manifest, &config.build_variables, config.platform.as_deref());
    let evaluator = BuildNecessityEvaluator::new(&fingerprints, &*harness.storage);
    for evaluation in evaluator.evaluate_all(&["base", "web", "worker"]).await.unwrap() {
        assert_eq!(evaluation.decision, BuildDecision::UpToDate, "{}", evaluation.image);
    }

    // A second run finds everything in the cache
    get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(harness.builder.build_count(), 3);
}

#[tokio::test]
async fn test_evaluation_is_repeatable_without_builds() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let config = harness.config();
    harness.storage.preload(&harness.fingerprint(&config, "worker").await, "worker-cached");
    let manifest = harness.project.manifest().unwrap();

    let fingerprints =
        FingerprintCalculator::new(&manifest, &config.build_variables, config.platform.as_deref());
    let evaluator = BuildNecessityEvaluator::new(&fingerprints, &*harness.storage);
    let first = evaluator.evaluate_all(&["web", "worker"]).await.unwrap();
    let second = evaluator.evaluate_all(&["web", "worker"]).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.storage.commit_count(), 0);
    assert_eq!(harness.storage.lock_count(), 0);
}

#[tokio::test]
async fn test_filter_keeps_declaration_order_and_builds_dependencies() {
    let harness = Harness::new(&ManifestFixture::with_base_image());
    let mut config = harness.config();
    config.images = ImagesToProcess::Only(vec!["worker".to_string(), "worker".to_string()]);
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    // base is built for worker but not reported
    assert_eq!(doc.images.keys().collect::<Vec<_>>(), vec!["worker"]);
    let built: Vec<String> =
        harness.builder.requests().await.into_iter().map(|request| request.image).collect();
    assert_eq!(built, vec!["base", "worker"]);
}

#[tokio::test]
async fn test_repository_is_required_outside_stub_mode() {
    let harness = Harness::new(&ManifestFixture::single_image());
    let mut config = harness.config();
    config.repo = None;
    let manifest = harness.project.manifest().unwrap();

    let err =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap_err();

    assert!(matches!(find_values_error(&err), Some(ValuesError::RepoAddressRequired)));
    assert_eq!(harness.infra.request_count(), 0);
}

#[tokio::test]
async fn test_without_images_needs_no_repository() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let mut config = harness.config();
    config.repo = None;
    config.images = ImagesToProcess::WithoutImages;
    config.environment = Some("staging".to_string());
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert!(doc.images.is_empty());
    assert!(doc.repo.is_none());
    assert_eq!(doc.namespace, "demo-staging");
    assert_eq!(harness.infra.request_count(), 0);
    let yaml = doc.to_yaml().unwrap();
    assert!(!yaml.contains("repo:"));
    assert!(yaml.contains("env: staging"));
}
