use imgvals_cli::deploy::{is_valid_namespace, namespace_slug, render_template};

#[test]
fn test_render_template() {
    assert_eq!(render_template("[[ project ]]-[[ env ]]", "demo", "prod"), "demo-prod");
    assert_eq!(render_template("team-[[project]]", "demo", ""), "team-demo");
    assert_eq!(render_template("fixed", "demo", "prod"), "fixed");
}

#[test]
fn test_slugs_are_always_valid() {
    let long = "long-name-".repeat(10);
    let inputs = [
        "demo",
        "Demo-Production",
        "demo--prod",
        "-leading",
        "trailing-",
        "ünïcödé",
        "a.b.c",
        "",
        long.as_str(),
    ];
    for input in inputs {
        let slug = namespace_slug(input);
        assert!(is_valid_namespace(&slug), "{input:?} -> {slug:?}");
    }
}

#[test]
fn test_slug_is_deterministic() {
    assert_eq!(namespace_slug("Demo Production"), namespace_slug("Demo Production"));
    assert_ne!(namespace_slug("Demo Production"), namespace_slug("demo_production"));
}
