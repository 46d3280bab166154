use std::path::Path;
use std::process::{Command, Output};

const ENV_KEYS: [&str; 8] = [
    "CLIP_ANNOTATOR_CONFIG",
    "CLIP_ANNOTATOR_LOG_MODE",
    "CLIP_ANNOTATOR_INPUT_DIR",
    "CLIP_ANNOTATOR_OUTPUT_DIR",
    "CLIP_ANNOTATOR_WINDOW_SIZE",
    "CLIP_ANNOTATOR_BACKEND",
    "CLIP_ANNOTATOR_EXTRACTOR",
    "CLIP_ANNOTATOR_CLASSIFIER",
];

fn run(args: &[&str]) -> Output {
    run_with_env(args, &[])
}

fn run_with_env(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_clip_annotate"));
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.envs(env.iter().copied());
    cmd.env("RUST_LOG", "warn")
        .args(["--ui", "plain"])
        .args(args)
        .output()
        .expect("run clip_annotate")
}

fn setup(root: &Path) {
    let videos = root.join("videos");
    std::fs::create_dir_all(&videos).unwrap();
    std::fs::write(
        videos.join("a.synth"),
        r#"{"frames": 9, "width": 24, "height": 16}"#,
    )
    .unwrap();
    std::fs::write(root.join("extractor.json"), r#"{"grid": 1}"#).unwrap();
    std::fs::write(
        root.join("classifier.json"),
        r#"{"weights": [0.0, 0.0, 0.0, 0.0], "bias": 1.0}"#,
    )
    .unwrap();
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn log_mode_prints_frame_lines_and_report() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let report = dir.path().join("report.json");

    let output = run(&[
        "--input-dir",
        &path_arg(&dir.path().join("videos")),
        "--extractor",
        &path_arg(&dir.path().join("extractor.json")),
        "--classifier",
        &path_arg(&dir.path().join("classifier.json")),
        "--window-size",
        "4",
        "--report",
        &path_arg(&report),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "1 action 0.731059");
    assert_eq!(lines[7], "8 action 0.731059");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["completed"], 1);
    assert_eq!(json["videos"][0]["frames_dropped"], 1);
}

#[test]
fn model_load_failure_produces_no_output() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let out_dir = dir.path().join("out");

    let output = run(&[
        "--video",
        "--container",
        "y4m",
        "--input-dir",
        &path_arg(&dir.path().join("videos")),
        "--output-dir",
        &path_arg(&out_dir),
        "--extractor",
        &path_arg(&dir.path().join("missing.json")),
        "--classifier",
        &path_arg(&dir.path().join("classifier.json")),
    ]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(!out_dir.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("model load failed"));
}

#[test]
fn invalid_override_is_rejected_before_models_load() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let output = run(&[
        "--input-dir",
        &path_arg(&dir.path().join("videos")),
        "--window-size",
        "0",
    ]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("window_size"));
}

#[test]
fn window_size_flag_overrides_invalid_env() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let output = run_with_env(
        &[
            "--input-dir",
            &path_arg(&dir.path().join("videos")),
            "--extractor",
            &path_arg(&dir.path().join("extractor.json")),
            "--classifier",
            &path_arg(&dir.path().join("classifier.json")),
            "--window-size",
            "3",
        ],
        &[("CLIP_ANNOTATOR_WINDOW_SIZE", "0")],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8(output.stdout).unwrap().lines().count(), 9);
}
