//! App-private filesystem layout.
//!
//! The host injects these at construction; nothing here touches global
//! state, so tests can run independent sessions in parallel.

use std::path::{Path, PathBuf};

/// Locations the sandboxed engine is allowed to see.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// App-private files directory (engine working dir and asset root).
    pub files_dir: PathBuf,
    /// Per-run cache directory (tunnel config file lives here).
    pub cache_dir: PathBuf,
    /// Path to the bundled engine binary.
    pub engine_binary: PathBuf,
}

impl AppPaths {
    pub fn new(
        files_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        engine_binary: impl Into<PathBuf>,
    ) -> Self {
        Self {
            files_dir: files_dir.into(),
            cache_dir: cache_dir.into(),
            engine_binary: engine_binary.into(),
        }
    }

    /// Where the tunnel driver's key-value config is written.
    pub fn tunnel_config_path(&self) -> PathBuf {
        self.cache_dir.join("tproxy.conf")
    }

    /// Environment restricting the engine to app-private paths.
    ///
    /// `HOME`, `TMPDIR` and `TMP` are pinned so the engine cannot probe
    /// system paths, and the asset-location variable points at the
    /// files directory.
    pub fn engine_env(&self) -> Vec<(String, String)> {
        let files = path_str(&self.files_dir);
        let cache = path_str(&self.cache_dir);
        vec![
            ("XRAY_LOCATION_ASSET".to_string(), files.clone()),
            ("HOME".to_string(), files),
            ("TMPDIR".to_string(), cache.clone()),
            ("TMP".to_string(), cache),
        ]
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_env_pins_private_paths() {
        let paths = AppPaths::new("/data/files", "/data/cache", "/lib/libxray.so");
        let env = paths.engine_env();
        assert!(
            env.iter()
                .any(|(k, v)| k == "XRAY_LOCATION_ASSET" && v == "/data/files")
        );
        assert!(env.iter().any(|(k, v)| k == "HOME" && v == "/data/files"));
        assert!(env.iter().any(|(k, v)| k == "TMPDIR" && v == "/data/cache"));
    }

    #[test]
    fn tunnel_config_in_cache_dir() {
        let paths = AppPaths::new("/data/files", "/data/cache", "/lib/libxray.so");
        assert_eq!(
            paths.tunnel_config_path(),
            PathBuf::from("/data/cache/tproxy.conf")
        );
    }
}
