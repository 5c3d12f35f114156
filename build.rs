// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;
use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=KINECT_BRIDGE_VERSION");

    // Packagers may pin the version instead of relying on git
    let version = std::env::var("KINECT_BRIDGE_VERSION").unwrap_or_else(|_| git_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);

    if std::env::var_os("CARGO_FEATURE_KCBV2").is_some() {
        link_kcbv2();
    }
}

/// `0.1.0-abcdef1` at a tag, `0.1.0-dirty-abcdef1` past one, the package
/// version with the commit hash when there are no tags
fn git_version() -> String {
    let hash = git(&["rev-parse", "--short", "HEAD"]);
    let describe = git(&["describe", "--tags", "--match", "v*"]);

    let Some(describe) = describe else {
        let package = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
        return match hash {
            Some(hash) => format!("{}-{}", package, hash),
            None => package,
        };
    };

    let describe = describe.strip_prefix('v').unwrap_or(&describe).to_string();
    // "<tag>-<commits>-g<hash>" when HEAD is past the tag
    let parts: Vec<&str> = describe.rsplitn(3, '-').collect();
    if parts.len() == 3 && parts[0].starts_with('g') {
        format!("{}-dirty-{}", parts[2], &parts[0][1..])
    } else {
        format!("{}-{}", describe, hash.unwrap_or_else(|| "unknown".to_string()))
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}

/// Point the linker at `KCBv2.lib`
///
/// `KCBV2_LIB_DIR` names the directory directly. Otherwise the library is
/// expected next to the Kinect SDK's own import libraries.
fn link_kcbv2() {
    println!("cargo::rerun-if-env-changed=KCBV2_LIB_DIR");
    println!("cargo::rerun-if-env-changed=KINECTSDK20_DIR");

    let arch = match std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() {
        Ok("x86") => "x86",
        _ => "x64",
    };

    let dir = if let Some(dir) = std::env::var_os("KCBV2_LIB_DIR") {
        PathBuf::from(dir)
    } else if let Some(sdk) = std::env::var_os("KINECTSDK20_DIR") {
        PathBuf::from(sdk).join("Lib").join(arch)
    } else {
        println!(
            "cargo::warning=feature `kcbv2` is enabled but neither KCBV2_LIB_DIR nor KINECTSDK20_DIR is set"
        );
        return;
    };

    println!("cargo::rustc-link-search=native={}", dir.display());
}
