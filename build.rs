//! Embeds the build identity logged at startup

use std::process::Command;

fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let rev = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!rev.is_empty()).then_some(rev)
}

fn main() {
    let base = env!("CARGO_PKG_VERSION");

    // CI without a checkout passes the revision explicitly
    let revision = std::env::var("EVSE_BUILD_REV")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(git_revision);

    let version = match revision {
        Some(rev) => format!("{base}+{rev}"),
        None => base.to_string(),
    };
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=EVSE_BUILD_VERSION={version}");
    println!("cargo:rustc-env=EVSE_BUILD_PROFILE={profile}");
    println!("cargo:rerun-if-env-changed=EVSE_BUILD_REV");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
