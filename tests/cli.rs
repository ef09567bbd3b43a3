use std::error::Error;
use std::fs;
use std::process::{Command, Output};
use tempfile::tempdir;

fn bundlekit_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_bundlekit"))
}

fn run(args: &[&str]) -> Output {
    bundlekit_cmd()
        .args(args)
        .output()
        .expect("failed to run bundlekit binary")
}

const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

#[test]
fn version_flag_prints_build_information() {
    let output = run(&["--version"]);
    assert!(
        output.status.success(),
        "version command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.starts_with("bundlekit "),
        "unexpected version line: {}",
        stdout
    );
    assert!(stdout.contains("build"), "version output should include build value: {}", stdout);
}

#[test]
fn build_leaves_no_counter_file_in_crate() {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    assert!(
        !manifest_dir.join("BUILD_NUMBER").exists(),
        "build script should not write side files into the crate"
    );
    let output = run(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let build = stdout
        .split(" build ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();
    assert!(build.parse::<u64>().is_ok(), "build number should be numeric: {}", stdout);
}

#[test]
fn running_without_subcommand_displays_help() {
    let output = run(&[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("bundleinfo"));
    assert!(stdout.contains("makebundle"));
}

#[test]
fn makebundle_then_bundleinfo() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let site = dir.path().join("site");
    fs::create_dir_all(&site)?;
    fs::write(site.join("index.html"), b"<html/>")?;
    fs::write(site.join("style.css"), b"p {}")?;
    let bundle = dir.path().join("site.agb");

    let make = run(&[
        "makebundle",
        site.to_str().unwrap(),
        "-o",
        bundle.to_str().unwrap(),
        "-i",
        "index.html",
    ]);
    assert!(
        make.status.success(),
        "makebundle failed: {}",
        String::from_utf8_lossy(&make.stderr)
    );
    assert!(String::from_utf8(make.stdout)?.contains("Wrote 2 files"));

    let info = run(&["bundleinfo", bundle.to_str().unwrap()]);
    assert!(info.status.success());
    let stdout = String::from_utf8(info.stdout)?;
    assert!(stdout.contains(r#""content_type":{"type":"string","value":"text/html"}"#));
    assert!(stdout.contains(r#""main_file":{"type":"string","value":"index.html"}"#));
    assert!(stdout.contains("  Path: index.html"));
    assert!(stdout.contains("  Path: style.css"));
    Ok(())
}

#[test]
fn encrypted_bundle_needs_key_for_properties() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("doc.pdf");
    fs::write(&input, b"%PDF-1.4 sample")?;
    let bundle = dir.path().join("doc.agb");

    let make = run(&[
        "makebundle",
        input.to_str().unwrap(),
        "-o",
        bundle.to_str().unwrap(),
        "-K",
        KEY,
    ]);
    assert!(
        make.status.success(),
        "makebundle failed: {}",
        String::from_utf8_lossy(&make.stderr)
    );

    let public = run(&["bundleinfo", "-p", bundle.to_str().unwrap()]);
    assert!(public.status.success());
    let stdout = String::from_utf8(public.stdout)?;
    assert!(stdout.contains("Bundle info:"));
    assert!(!stdout.contains("Bundle properties:"));
    assert!(stdout.contains("  Path: index.pdf"));

    let keyed = run(&["bundleinfo", "-k", KEY, bundle.to_str().unwrap()]);
    assert!(
        keyed.status.success(),
        "bundleinfo failed: {}",
        String::from_utf8_lossy(&keyed.stderr)
    );
    let stdout = String::from_utf8(keyed.stdout)?;
    assert!(stdout.contains(r#""main_file":{"type":"string","value":"index.pdf"}"#));
    Ok(())
}

#[test]
fn short_key_is_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("a.pdf");
    fs::write(&input, b"%PDF").unwrap();
    let out = dir.path().join("a.agb");

    let output = run(&[
        "makebundle",
        input.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "-K",
        "0011",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("256"));
}

#[test]
fn missing_input_reports_error() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("x.agb");
    let output = run(&[
        "makebundle",
        dir.path().join("nope.zip").to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: Path does not exist"), "stderr: {}", stderr);
}

#[test]
fn unwritable_format_is_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("a.pdf");
    fs::write(&input, b"%PDF").unwrap();
    let output = run(&[
        "makebundle",
        input.to_str().unwrap(),
        "-o",
        dir.path().join("out.epub").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}
