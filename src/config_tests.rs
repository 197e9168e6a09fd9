use super::*;

fn write_config_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(DEFAULT_CONFIG_FILE);
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[test]
fn defaults_are_valid() {
    let config = default_config();
    validate_config(&config).expect("defaults validate");
    assert_eq!(config.max_iterations, 3);
    assert_eq!(config.quality_threshold, 7);
    assert!(config.review_enabled);
    assert_eq!(config.lighting.blend_mode, BlendMode::Layered);
    assert_eq!(config.render_mode, RenderMode::Preview);
}

#[test]
fn stub_round_trips() {
    let stub = config_stub().expect("stub");
    let parsed: WorkflowConfig = serde_json::from_str(&stub).expect("parse stub");
    assert_eq!(parsed, default_config());
}

#[test]
fn partial_file_fills_defaults() {
    let (_dir, path) = write_config_file(
        r#"{"max_iterations": 5, "stages": {"lighting": false}, "lighting": {"blend_mode": "dominant"}}"#,
    );
    let config = load_config(&path).expect("load");
    assert_eq!(config.max_iterations, 5);
    assert!(!config.stages.lighting);
    assert!(config.stages.geometry);
    assert_eq!(config.lighting.blend_mode, BlendMode::Dominant);
    assert_eq!(config.lighting.max_layers, 4);
    assert_eq!(config.quality_threshold, 7);
}

#[test]
fn unknown_fields_are_rejected() {
    let (_dir, path) = write_config_file(r#"{"max_iteration": 5}"#);
    let err = load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("unknown field"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    assert!(resolve_config(Some(&dir.path().join("absent.json"))).is_err());
}

type Mutation = Box<dyn Fn(&mut WorkflowConfig)>;

fn case(field: &'static str, mutate: impl Fn(&mut WorkflowConfig) + 'static) -> (&'static str, Mutation) {
    (field, Box::new(mutate))
}

#[test]
fn validation_rejects_out_of_range_values() {
    let cases = [
        case("schema_version", |c| c.schema_version = 9),
        case("max_iterations", |c| c.max_iterations = 0),
        case("quality_threshold", |c| c.quality_threshold = 0),
        case("quality_threshold", |c| c.quality_threshold = 11),
        case("timeout", |c| c.render_timeout_secs = 0),
        case("asset_limit", |c| c.lighting.asset_limit = 0),
        case("max_layers", |c| c.lighting.max_layers = 0),
        case("world_strength", |c| c.lighting.world_strength = 0.0),
        case("world_strength", |c| c.lighting.world_strength = f64::NAN),
    ];
    for (field, mutate) in cases {
        let mut config = default_config();
        mutate(&mut config);
        let err = validate_config(&config).expect_err(field);
        assert!(err.to_string().contains(field), "{field}: {err}");
    }
}

#[test]
fn toggles_follow_stage_ids() {
    let mut toggles = StageToggles::default();
    toggles.set(StageId::Materials, false);
    assert!(!toggles.is_enabled(StageId::Materials));
    assert!(toggles.is_enabled(StageId::Geometry));
    assert!(toggles.is_enabled(StageId::Review));
}
