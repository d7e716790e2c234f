use std::{fs, path::Path, process::Command};

use image::{GrayImage, Luma, Rgb, RgbImage};

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shadow-compositor"))
}

fn write_inputs(dir: &Path) {
    RgbImage::from_fn(48, 48, |x, y| {
        if (12..36).contains(&x) && (12..36).contains(&y) {
            Rgb([230, 200, 60])
        } else {
            Rgb([30, 40, 90])
        }
    })
    .save(dir.join("fg.png"))
    .unwrap();
    RgbImage::from_pixel(64, 56, Rgb([180, 180, 180]))
        .save(dir.join("bg.png"))
        .unwrap();
    GrayImage::from_fn(48, 48, |x, y| {
        if (12..36).contains(&x) && (12..36).contains(&y) { Luma([255]) } else { Luma([0]) }
    })
    .save(dir.join("mask.png"))
    .unwrap();
}

#[test]
fn test_cli_writes_outputs_with_supplied_mask() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let output = dir.path().join("out");

    let status = binary()
        .arg("--fg")
        .arg(dir.path().join("fg.png"))
        .arg("--bg")
        .arg(dir.path().join("bg.png"))
        .arg("--mask")
        .arg(dir.path().join("mask.png"))
        .args(["--angle", "-45", "--elevation", "20", "--report"])
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    for name in ["composite.png", "shadow_only.png", "mask_debug.png"] {
        let image = image::open(output.join(name)).unwrap();
        assert_eq!((image.width(), image.height()), (64, 56));
    }
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["light"]["angle_degrees"], -45.0);
}

#[test]
fn test_cli_missing_input_fails_without_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let output = dir.path().join("out");

    let result = binary()
        .arg("--fg")
        .arg(dir.path().join("missing.png"))
        .arg("--bg")
        .arg(dir.path().join("bg.png"))
        .arg("--output")
        .arg(&output)
        .output()
        .unwrap();

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Error:"));
    let written = fs::read_dir(&output).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(written, 0);
}

#[test]
fn test_cli_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{ "shadow": { "blur_sigmas": [] } }"#).unwrap();

    let status = binary()
        .arg("--fg")
        .arg(dir.path().join("fg.png"))
        .arg("--bg")
        .arg(dir.path().join("bg.png"))
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(dir.path().join("out"))
        .status()
        .unwrap();
    assert!(!status.success());
}
