use anyhow::Context;
use imgvals_cli::core::{FailureClass, ValuesError, classify, user_friendly_error};

#[test]
fn test_taxonomy_classification() {
    let cases: Vec<(ValuesError, FailureClass)> = vec![
        (
            ValuesError::ImageNotFound {
                name: "web".into(),
            },
            FailureClass::Fatal,
        ),
        (
            ValuesError::LockTimeout {
                lock: "stage".into(),
                timeout_secs: 10,
            },
            FailureClass::Retryable,
        ),
        (
            ValuesError::RegistryUnavailable {
                image: "web".into(),
                reason: "503".into(),
            },
            FailureClass::Retryable,
        ),
        (
            ValuesError::PushRejected {
                image: "web".into(),
                reason: "denied".into(),
            },
            FailureClass::Fatal,
        ),
        (
            ValuesError::BuildFailed {
                image: "web".into(),
                reason: "exit 1".into(),
            },
            FailureClass::Fatal,
        ),
        (
            ValuesError::AssemblyError {
                reason: "bad".into(),
            },
            FailureClass::Fatal,
        ),
        (ValuesError::Cancelled, FailureClass::Cancelled),
    ];

    for (error, expected) in cases {
        let message = error.to_string();
        let err = anyhow::Error::from(error).context("Failed to build image 'web'");
        assert_eq!(classify(&err), expected, "{message}");
    }
}

#[test]
fn test_user_friendly_error_keeps_context() {
    let result: anyhow::Result<()> = Err(ValuesError::BuildFailed {
        image: "web".into(),
        reason: "exit 1".into(),
    }
    .into());
    let err = result.context("Failed to build image 'web'").unwrap_err();

    let ctx = user_friendly_error(err);
    assert!(matches!(ctx.error, ValuesError::BuildFailed { .. }));
    assert_eq!(ctx.details.as_deref(), Some("Failed to build image 'web'"));
    assert!(ctx.suggestion.is_some());
}

#[test]
fn test_repo_required_suggests_stub_tags() {
    let ctx = user_friendly_error(ValuesError::RepoAddressRequired.into());
    let rendered = ctx.to_string();
    assert!(rendered.contains("Repository address is required"));
    assert!(rendered.contains("--stub-tags"));
}
