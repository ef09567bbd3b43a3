use std::env;
use std::process::Command;

fn main() {
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    // CI sets the build number; local builds report 0
    let build = env::var("BUNDLEKIT_BUILD_NUMBER")
        .ok()
        .filter(|n| n.parse::<u64>().is_ok())
        .unwrap_or_else(|| "0".to_string());

    let profile = match env::var("PROFILE").as_deref() {
        Ok("release") => "release",
        _ => "development",
    };

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BUNDLEKIT_VERSION={}", version);
    println!("cargo:rustc-env=BUNDLEKIT_BUILD={}", build);
    println!("cargo:rustc-env=BUNDLEKIT_PROFILE={}", profile);
    println!("cargo:rustc-env=BUNDLEKIT_GIT_HASH={}", git_hash);

    println!("cargo:rerun-if-env-changed=BUNDLEKIT_BUILD_NUMBER");
    println!("cargo:rerun-if-env-changed=PROFILE");
}
