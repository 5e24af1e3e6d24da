use imgvals_cli::cancel::CancelSignal;
use imgvals_cli::core::{ValuesError, find_values_error};
use imgvals_cli::pipeline::get_service_values;
use imgvals_cli::test_utils::ManifestFixture;

use crate::common::{Harness, REPO};

#[tokio::test]
async fn test_custom_tags_are_reported_without_digest() {
    let harness = Harness::new(&ManifestFixture::web_and_worker());
    let mut config = harness.config();
    config.custom_tag = Some("%image_slug%-release".to_string());
    harness.storage.preload(&harness.fingerprint(&config, "web").await, "web-cached");
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(doc.images["web"].tag, "web-release");
    assert_eq!(doc.images["worker"].tag, "worker-release");
    assert_eq!(doc.images["worker"].image, format!("{REPO}:worker-release"));
    assert!(doc.images.values().all(|image| image.digest.is_none()));
    // worker was still built and pushed under its content tag
    assert_eq!(harness.builder.build_count(), 1);
    assert_ne!(harness.builder.requests().await[0].tag, "worker-release");
}

#[tokio::test]
async fn test_invalid_custom_tag_is_fatal() {
    let harness = Harness::new(&ManifestFixture::single_image());
    let mut config = harness.config();
    config.custom_tag = Some("%image%/latest".to_string());
    let manifest = harness.project.manifest().unwrap();

    let err =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap_err();

    assert!(matches!(find_values_error(&err), Some(ValuesError::AssemblyError { .. })));
    assert_eq!(harness.builder.build_count(), 1);
}

#[tokio::test]
async fn test_namespace_from_manifest_template() {
    let harness = Harness::new(&ManifestFixture::with_base_image());
    let mut config = harness.config();
    config.stub_tags = true;
    config.environment = Some("Production".to_string());
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(doc.env, "Production");
    assert!(doc.namespace.starts_with("demo-production-"));
    assert!(doc.namespace.len() <= 63);
}

#[tokio::test]
async fn test_explicit_namespace_wins() {
    let harness = Harness::new(&ManifestFixture::with_base_image());
    let mut config = harness.config();
    config.stub_tags = true;
    config.environment = Some("production".to_string());
    config.namespace = Some("shared-apps".to_string());
    let manifest = harness.project.manifest().unwrap();

    let doc =
        get_service_values(&config, &manifest, &harness.infra, &harness.git, &CancelSignal::never())
            .await
            .unwrap();

    assert_eq!(doc.namespace, "shared-apps");
    assert_eq!(doc.env, "production");
}
