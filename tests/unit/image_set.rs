use std::path::Path;

use imgvals_cli::core::{ValuesError, find_values_error};
use imgvals_cli::images::{ImagesToProcess, resolve_images};
use imgvals_cli::manifest::Manifest;

const MANIFEST: &str = r#"
[project]
name = "demo"

[[image]]
name = "base"

[[image]]
name = "web"
dependencies = ["base"]

[[image]]
name = "worker"
dependencies = ["base"]
"#;

fn manifest() -> Manifest {
    Manifest::parse(MANIFEST, Path::new("/project")).unwrap()
}

fn names(filter: &ImagesToProcess) -> Vec<String> {
    resolve_images(&manifest(), filter).unwrap().into_iter().map(|image| image.name).collect()
}

#[test]
fn test_all_images_in_declaration_order() {
    assert_eq!(names(&ImagesToProcess::All), vec!["base", "web", "worker"]);
    assert!(names(&ImagesToProcess::WithoutImages).is_empty());
}

#[test]
fn test_filter_is_deduplicated_and_ordered() {
    let filter = ImagesToProcess::from_args(
        vec!["worker".to_string(), "base".to_string(), "worker".to_string()],
        false,
    );
    assert_eq!(names(&filter), vec!["base", "worker"]);
}

#[test]
fn test_unknown_name_is_a_configuration_error() {
    let filter = ImagesToProcess::Only(vec!["web".to_string(), "api".to_string()]);
    let err = resolve_images(&manifest(), &filter).unwrap_err();
    assert!(matches!(
        find_values_error(&err),
        Some(ValuesError::ImageNotFound { name }) if name == "api"
    ));
}

#[test]
fn test_invalid_manifests_are_rejected() {
    let cases = [
        ("[project]\nname = \"\"\n", "project name"),
        (
            "[project]\nname = \"demo\"\n[[image]]\nname = \"web\"\n[[image]]\nname = \"web\"\n",
            "more than once",
        ),
        (
            "[project]\nname = \"demo\"\n[[image]]\nname = \"web\"\ndependencies = [\"base\"]\n",
            "undeclared image 'base'",
        ),
        (
            "[project]\nname = \"demo\"\n[[image]]\nname = \"a\"\ndependencies = [\"b\"]\n\
             [[image]]\nname = \"b\"\ndependencies = [\"a\"]\n",
            "cycle",
        ),
    ];

    for (content, expected) in cases {
        let err = Manifest::parse(content, Path::new("/project")).unwrap_err();
        assert!(
            matches!(find_values_error(&err), Some(ValuesError::ManifestValidationError { .. })),
            "{content}"
        );
        assert!(err.to_string().contains(expected), "{err}");
    }
}
