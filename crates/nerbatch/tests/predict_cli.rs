use std::fs;
use std::process::Command;

fn predict() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nerbatch-predict"));
    cmd.env_remove("NERBATCH_FORMAT_CONVERTER");
    cmd
}

#[test]
fn missing_model_directory_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();

    let output = predict()
        .args(["--model_type", "bert", "--pretrained_model"])
        .arg(dir.path().join("no-model"))
        .arg("--preprocessed_text_dir")
        .arg(&input)
        .arg("--raw_text_dir")
        .arg(&input)
        .arg("--output_dir")
        .arg(dir.path().join("out"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid configuration"), "stderr: {stderr}");
    assert!(!dir.path().join("out").exists());
}

#[test]
fn missing_tokenizer_is_fatal_before_any_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model");
    let input = dir.path().join("in");
    fs::create_dir_all(&model).unwrap();
    fs::create_dir_all(&input).unwrap();
    fs::write(model.join("label2idx.json"), r#"{"O": 0, "B-PER": 1}"#).unwrap();
    fs::write(input.join("doc1.txt"), "John\n").unwrap();

    let output = predict()
        .args(["--model_type", "bert", "--use_bio", "--log_lvl", "e"])
        .arg("--pretrained_model")
        .arg(&model)
        .arg("--preprocessed_text_dir")
        .arg(&input)
        .arg("--raw_text_dir")
        .arg(&input)
        .arg("--output_dir")
        .arg(dir.path().join("out"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load model"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn unknown_model_type_is_a_usage_error() {
    let output = predict()
        .args([
            "--model_type",
            "gpt2",
            "--pretrained_model",
            "m",
            "--preprocessed_text_dir",
            "i",
            "--raw_text_dir",
            "r",
            "--output_dir",
            "o",
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
}
