// SPDX-License-Identifier: MPL-2.0

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=CAMERA_EFFECTS_VERSION");

    // Packagers may pin the version explicitly
    let version = std::env::var("CAMERA_EFFECTS_VERSION").unwrap_or_else(|_| describe());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` without the leading `v`, or the crate version outside a checkout
fn describe() -> String {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty", "--match", "v*"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
            raw.strip_prefix('v').unwrap_or(&raw).to_string()
        }
        _ => env!("CARGO_PKG_VERSION").to_string(),
    }
}
