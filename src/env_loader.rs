use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;

include!(concat!(env!("OUT_DIR"), "/warden_env_allowlist.rs"));

fn fallback_dotenv_path(warden_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(home) = warden_home {
        return Some(home.join(".env"));
    }
    Some(home_dir?.join("warden/.env"))
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("WARDEN_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

fn unknown_keys<'a>(present: impl IntoIterator<Item = &'a str>, allowed: &[&str]) -> Vec<String> {
    let allowed: BTreeSet<&str> = allowed.iter().copied().collect();
    present
        .into_iter()
        .filter(|key| key.starts_with("WARDEN_") && !allowed.contains(key))
        .map(ToOwned::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `WARDEN_*` variables set in the environment that nothing reads; usually
/// typos.
pub fn unknown_warden_env_keys() -> Vec<String> {
    let present: Vec<String> = env::vars_os()
        .filter_map(|(key, _)| key.into_string().ok())
        .collect();
    unknown_keys(present.iter().map(String::as_str), GENERATED_WARDEN_ENV_ALLOWLIST)
}

#[cfg(test)]
mod tests {
    use super::{GENERATED_WARDEN_ENV_ALLOWLIST, fallback_dotenv_path, unknown_keys};
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_warden_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/workspace/warden")),
            Some(PathBuf::from("/home/alice")),
        );
        assert_eq!(got, Some(PathBuf::from("/workspace/warden/.env")));
    }

    #[test]
    fn fallback_uses_home_when_warden_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/alice")));
        assert_eq!(got, Some(PathBuf::from("/home/alice/warden/.env")));
    }

    #[test]
    fn allowlist_covers_keys_read_by_the_crate() {
        for key in ["WARDEN_HOME", "WARDEN_REGISTRY", "WARDEN_TIMEZONE"] {
            assert!(GENERATED_WARDEN_ENV_ALLOWLIST.contains(&key), "{key}");
        }
    }

    #[test]
    fn allowlist_skips_keys_embedded_in_longer_identifiers() {
        let embedded = ["WARDEN", "ENV", "ALLOWLIST"].join("_");
        assert!(!GENERATED_WARDEN_ENV_ALLOWLIST.contains(&embedded.as_str()));
    }

    #[test]
    fn typos_are_flagged_and_other_prefixes_ignored() {
        // built at runtime so the allowlist scan does not pick it up
        let typo = ["WARDEN", "HOEM"].join("_");
        let got = unknown_keys(
            ["WARDEN_HOME", typo.as_str(), "PATH", typo.as_str()],
            &["WARDEN_HOME"],
        );
        assert_eq!(got, vec![typo.clone()]);
    }
}
