use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use clip_annotator::config::{AnnotateConfig, CONFIG_ENV};
use clip_annotator::{BackendKind, Container, PipelineError};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        CONFIG_ENV,
        "CLIP_ANNOTATOR_LOG_MODE",
        "CLIP_ANNOTATOR_INPUT_DIR",
        "CLIP_ANNOTATOR_OUTPUT_DIR",
        "CLIP_ANNOTATOR_WINDOW_SIZE",
        "CLIP_ANNOTATOR_BACKEND",
        "CLIP_ANNOTATOR_EXTRACTOR",
        "CLIP_ANNOTATOR_CLASSIFIER",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "input_dir": "footage",
        "log_mode": false,
        "window_size": 16,
        "output": {
            "dir": "annotated",
            "width": 640,
            "height": 360,
            "suffix": "labelled",
            "container": "y4m"
        },
        "model": {
            "extractor_path": "models/extractor.json",
            "labels": ["idle", "fight"],
            "threshold": 0.7
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var(CONFIG_ENV, file.path());
    std::env::set_var("CLIP_ANNOTATOR_WINDOW_SIZE", "32");
    std::env::set_var("CLIP_ANNOTATOR_CLASSIFIER", "models/head.json");

    let cfg = AnnotateConfig::load().expect("load config");

    assert_eq!(cfg.input_dir, PathBuf::from("footage"));
    assert!(!cfg.log_mode);
    assert_eq!(cfg.window_size, 32);
    assert_eq!(cfg.output.dir, PathBuf::from("annotated"));
    assert_eq!((cfg.output.width, cfg.output.height), (640, 360));
    assert_eq!(cfg.output.fps, 30);
    assert_eq!(cfg.output.suffix, "labelled");
    assert_eq!(cfg.output.container, Container::Y4m);
    assert_eq!(cfg.model.backend, BackendKind::Native);
    assert_eq!(cfg.model.extractor_path, PathBuf::from("models/extractor.json"));
    assert_eq!(cfg.model.classifier_path, PathBuf::from("models/head.json"));
    assert_eq!(cfg.model.labels, ["idle".to_string(), "fight".to_string()]);
    assert_eq!(cfg.model.threshold, 0.7);
    assert_eq!(cfg.clip_shape(), [1, 3, 32, 112, 112]);

    clear_env();
}

#[test]
fn toml_files_are_detected_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
window_size = 8
input_width = 56
input_height = 56

[model]
backend = "native"
mean = [0.0, 0.0, 0.0]
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = AnnotateConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.window_size, 8);
    assert_eq!(cfg.clip_shape(), [1, 3, 8, 56, 56]);
    assert_eq!(cfg.model.mean, [0.0; 3]);
    assert!(cfg.log_mode);

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLIP_ANNOTATOR_LOG_MODE", "off");
    std::env::set_var("CLIP_ANNOTATOR_OUTPUT_DIR", "out");
    let cfg = AnnotateConfig::load().expect("load config");
    assert!(!cfg.log_mode);
    assert_eq!(cfg.output.dir, PathBuf::from("out"));
    assert_eq!(cfg.window_size, 60);
    assert_eq!(cfg.output.suffix, "c3d");

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLIP_ANNOTATOR_WINDOW_SIZE", "0");
    assert!(matches!(
        AnnotateConfig::load(),
        Err(PipelineError::Config(_))
    ));

    std::env::set_var("CLIP_ANNOTATOR_WINDOW_SIZE", "sixty");
    assert!(matches!(
        AnnotateConfig::load(),
        Err(PipelineError::Config(_))
    ));
    clear_env();

    std::env::set_var("CLIP_ANNOTATOR_BACKEND", "torch");
    assert!(AnnotateConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"window": 60}"#).expect("write config");
    let err = AnnotateConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.is_fatal());

    clear_env();
}

#[test]
fn command_line_layer_replaces_invalid_env_value() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CLIP_ANNOTATOR_WINDOW_SIZE", "0");
    let cfg = AnnotateConfig::load_with(None, |cfg| {
        cfg.window_size = 60;
        Ok(())
    })
    .expect("override wins before validation");
    assert_eq!(cfg.window_size, 60);

    let err = AnnotateConfig::load_with(None, |cfg| {
        cfg.window_size = 0;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));

    clear_env();
}
