use chrono::Utc;
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;

const UNKNOWN: &str = "unknown";

/// `[package.metadata] envelope_format_version` from the manifest
fn envelope_format_version(manifest: &Path) -> String {
    fs::read_to_string(manifest)
        .ok()
        .and_then(|contents| contents.parse::<toml::Table>().ok())
        .and_then(|manifest| {
            manifest
                .get("package")?
                .get("metadata")?
                .get("envelope_format_version")?
                .as_integer()
        })
        .map(|version| version.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn main() {
    let out_dir = env::var_os("OUT_DIR").expect("cargo sets OUT_DIR");
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR");
    let manifest = Path::new(&manifest_dir).join("Cargo.toml");

    let generated = format!(
        "pub const ENVELOPE_FORMAT_VERSION: &str = {:?};\n\
         pub const BUILD_TIME: &str = {:?};\n\
         pub const GIT_HASH: &str = {:?};\n",
        envelope_format_version(&manifest),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        git_hash(),
    );
    fs::write(Path::new(&out_dir).join("version.rs"), generated).expect("write version.rs");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
