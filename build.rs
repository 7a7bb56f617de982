use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "WARDEN_";

fn source_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

/// Every `WARDEN_*` token in `source` that is not the tail of a longer
/// identifier.
fn env_keys_in(source: &str) -> impl Iterator<Item = &str> {
    source.match_indices(ENV_PREFIX).filter_map(move |(start, _)| {
        let embedded = source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if embedded {
            return None;
        }
        let rest = &source[start + ENV_PREFIX.len()..];
        let len = rest.find(|c: char| !is_key_char(c)).unwrap_or(rest.len());
        (len > 0).then(|| &source[start..start + ENV_PREFIX.len() + len])
    })
}

fn render_allowlist(keys: &BTreeSet<String>) -> String {
    let mut out = String::from("pub const GENERATED_WARDEN_ENV_ALLOWLIST: &[&str] = &[\n");
    for key in keys {
        out.push_str(&format!("    \"{key}\",\n"));
    }
    out.push_str("];\n");
    out
}

fn main() -> std::io::Result<()> {
    let mut keys = BTreeSet::new();
    for file in source_files(Path::new("src"))? {
        if let Ok(content) = fs::read_to_string(&file) {
            keys.extend(env_keys_in(&content).map(ToOwned::to_owned));
        }
    }

    let out_dir = env::var_os("OUT_DIR").ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR is set by cargo")
    })?;
    fs::write(
        Path::new(&out_dir).join("warden_env_allowlist.rs"),
        render_allowlist(&keys),
    )?;

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
    Ok(())
}
