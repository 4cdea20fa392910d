//! Ensures every workspace crate inherits the workspace version and that the
//! binary reports the same version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn manifest(dir: &Path) -> toml::Value {
    std::fs::read_to_string(dir.join("Cargo.toml"))
        .unwrap()
        .parse()
        .unwrap()
}

#[test]
fn test_all_crates_use_workspace_version() {
    let root = workspace_root();
    let members = manifest(&root)["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(members.len(), 4);

    for member in &members {
        let doc = manifest(&root.join(member));
        let inherits = doc["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn test_workspace_version_matches_cargo_pkg() {
    let doc = manifest(&workspace_root());
    let ws_version = doc["workspace"]["package"]["version"].as_str().unwrap();
    assert_eq!(ws_version, env!("CARGO_PKG_VERSION"));
}
