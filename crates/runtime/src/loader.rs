//! Dynamic extension loader and library search (§4.8).
//!
//! Maps a requested library name to one of several on-disk forms,
//! resolving a `.so` (native module, version read from a `latest` file
//! or supplied explicitly) or a `.idio` source file, searching the
//! colon-separated `IDIOLIB` path with a compiled-in fallback directory.
//!
//! `LoaderConfig` reads `IDIOLIB` through one small struct rather than
//! scattered `env::var` calls, grounded on the compiler crate's
//! `config::CompilerConfig` builder style.

use std::path::{Path, PathBuf};

use crate::condition::Condition;

const IDIO_VER: &str = "0";

/// Library search configuration: where `IDIOLIB` points, and the
/// compiled-in fallback used when nothing in the path resolves.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    search_path: Vec<PathBuf>,
    default_dir: PathBuf,
}

impl LoaderConfig {
    /// Build from the `IDIOLIB` environment variable; unset or empty
    /// falls back to just the compiled-in default directory (§6).
    pub fn from_env() -> Self {
        let search_path = std::env::var("IDIOLIB")
            .ok()
            .map(|v| parse_search_path(&v))
            .unwrap_or_default();
        LoaderConfig {
            search_path,
            default_dir: default_compiled_in_dir(),
        }
    }

    /// Override the compiled-in fallback directory, for embedders and
    /// tests that don't want to touch the real environment.
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = dir.into();
        self
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = dirs;
        self
    }

    /// The directories searched, in order, including the trailing
    /// compiled-in fallback.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs = self.search_path.clone();
        dirs.push(self.default_dir.clone());
        dirs
    }
}

/// Empty elements in the colon-separated list mean "current directory"
/// (§4.8).
fn parse_search_path(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(|seg| if seg.is_empty() { PathBuf::from(".") } else { PathBuf::from(seg) })
        .collect()
}

fn default_compiled_in_dir() -> PathBuf {
    PathBuf::from("/usr/lib/idio")
}

/// What kind of on-disk file a requested name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A native module: the shared object path, plus the sibling
    /// `.idio` file to evaluate after initialization, if present.
    Native { so_path: PathBuf, sibling_idio: Option<PathBuf> },
    /// A plain Idio source file.
    Source { path: PathBuf },
}

/// Sanitize a module name into a valid C identifier suffix for
/// `idio_init_<mod>`: non-alphanumeric characters map to `_` (§4.8).
pub fn sanitize_init_symbol(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 10);
    out.push_str("idio_init_");
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Read a directory's `latest` file (`M@V`) and return `V`, validating
/// that the module name prefix matches and stripping trailing
/// non-alphanumeric-non-dot characters from the version (§4.8).
fn read_latest_version(mod_dir: &Path, module: &str) -> Result<String, Condition> {
    let latest_path = mod_dir.join("latest");
    let contents = std::fs::read_to_string(&latest_path).map_err(|e| {
        Condition::from_io_error(&latest_path.display().to_string(), &e)
    })?;
    let line = contents.lines().next().unwrap_or("").trim();
    let at = line.find('@').ok_or_else(|| Condition::LoadError {
        name: module.to_string(),
        message: format!("malformed latest file {}: missing '@'", latest_path.display()),
    })?;
    let (name_part, ver_part) = (&line[..at], &line[at + 1..]);
    if name_part != module {
        return Err(Condition::LoadError {
            name: module.to_string(),
            message: format!(
                "latest file module mismatch: expected {module}, got {name_part}"
            ),
        });
    }
    let version = ver_part
        .trim_end_matches(|c: char| !(c.is_alphanumeric() || c == '.'))
        .to_string();
    if version.is_empty() {
        return Err(Condition::LoadError {
            name: module.to_string(),
            message: format!("latest file {} has empty version", latest_path.display()),
        });
    }
    Ok(version)
}

/// Resolve a requested module name to an on-disk form (§4.8's
/// numbered search procedure).
///
/// `arch` is the architecture triple used in `<ver>/<ARCH>/lib<mod>.so`.
/// `native` selects whether a `.so` probe is attempted before falling
/// back to `.idio`.
pub fn resolve(
    config: &LoaderConfig,
    requested: &str,
    version: Option<&str>,
    arch: &str,
    native: bool,
) -> Result<Resolved, Condition> {
    // 1. A name containing '/' is an absolute/relative path: no search.
    if requested.contains('/') {
        let path = PathBuf::from(requested);
        if path.exists() {
            return Ok(Resolved::Source { path });
        }
        return Err(Condition::LoadError {
            name: requested.to_string(),
            message: format!("no such file: {}", path.display()),
        });
    }

    for dir in config.directories() {
        crate::report::trace_search(format!("probing {}", dir.display()));
        let versioned_root = dir.join(IDIO_VER).join(requested);

        if native {
            let resolved_version = match version {
                Some(v) => Some(v.to_string()),
                None => read_latest_version(&versioned_root, requested).ok(),
            };
            if let Some(ver) = resolved_version {
                let mod_ver_dir = versioned_root.join(&ver);
                if mod_ver_dir.is_dir() {
                    let so_path = mod_ver_dir
                        .join(arch)
                        .join(format!("lib{requested}.so"));
                    if so_path.is_file() {
                        let sibling = mod_ver_dir.join(format!("{requested}.idio"));
                        let sibling_idio = sibling.is_file().then_some(sibling);
                        return Ok(Resolved::Native { so_path, sibling_idio });
                    }
                }
            }
        }

        let idio_path = dir.join(format!("{requested}.idio"));
        if idio_path.is_file() {
            return Ok(Resolved::Source { path: idio_path });
        }
    }

    Err(Condition::LoadError {
        name: requested.to_string(),
        message: format!("module {requested} not found on search path"),
    })
}

/// A `dlopen`ed native extension. The `Library` is kept alive for as
/// long as the module is loaded, since dropping it would invalidate
/// every symbol it handed out, including primitives the init call
/// registered.
pub struct NativeModule {
    pub library: libloading::Library,
    pub so_path: PathBuf,
}

/// The outcome of loading a requested module.
pub enum Loaded {
    /// A native module: already `dlopen`ed and its init entry point
    /// already invoked.
    Native {
        module: NativeModule,
        sibling_idio: Option<PathBuf>,
    },
    /// Idio source for the caller to evaluate.
    Source { path: PathBuf },
}

/// Resolve a requested module and, for a native result, actually load
/// it: `dlopen` the shared object and call its `idio_init_<mod>` entry
/// point (§4.8 — resolution alone only locates the file; loading a
/// module means running its initializer). Idio source is left for the
/// caller to evaluate, since this crate doesn't own the evaluator.
pub fn load(
    config: &LoaderConfig,
    requested: &str,
    version: Option<&str>,
    arch: &str,
) -> Result<Loaded, Condition> {
    match resolve(config, requested, version, arch, true)? {
        Resolved::Native { so_path, sibling_idio } => {
            let module = load_native(&so_path, requested)?;
            Ok(Loaded::Native { module, sibling_idio })
        }
        Resolved::Source { path } => Ok(Loaded::Source { path }),
    }
}

fn load_native(so_path: &Path, requested: &str) -> Result<NativeModule, Condition> {
    let library = unsafe { libloading::Library::new(so_path) }.map_err(|e| Condition::LoadError {
        name: requested.to_string(),
        message: format!("dlopen {}: {e}", so_path.display()),
    })?;
    let symbol_name = sanitize_init_symbol(requested);
    unsafe {
        let init: libloading::Symbol<unsafe extern "C" fn()> =
            library.get(symbol_name.as_bytes()).map_err(|e| Condition::LoadError {
                name: requested.to_string(),
                message: format!("dlsym {symbol_name}: {e}"),
            })?;
        init();
    }
    Ok(NativeModule {
        library,
        so_path: so_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial(idiolib_env)]
    fn from_env_splits_idiolib() {
        std::env::set_var("IDIOLIB", "/x:/y");
        let config = LoaderConfig::from_env();
        std::env::remove_var("IDIOLIB");
        assert_eq!(config.search_path, vec![PathBuf::from("/x"), PathBuf::from("/y")]);
    }

    #[test]
    fn parses_colon_separated_path_with_empty_as_cwd() {
        let dirs = parse_search_path("/a:/b::/c");
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a"),
                PathBuf::from("/b"),
                PathBuf::from("."),
                PathBuf::from("/c")
            ]
        );
    }

    #[test]
    fn sanitize_maps_non_alnum_to_underscore() {
        assert_eq!(sanitize_init_symbol("foo-bar.baz"), "idio_init_foo_bar_baz");
    }

    #[test]
    fn resolves_plain_source_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("mymod.idio"), "; empty\n").unwrap();
        let config = LoaderConfig::from_env()
            .with_search_path(vec![])
            .with_default_dir(tmp.path());
        let r = resolve(&config, "mymod", None, "x86_64", false).unwrap();
        assert!(matches!(r, Resolved::Source { .. }));
    }

    #[test]
    fn resolves_native_module_via_latest_file() {
        let tmp = TempDir::new().unwrap();
        let mod_dir = tmp.path().join("0").join("mymod");
        let ver_dir = mod_dir.join("1.0");
        let arch_dir = ver_dir.join("x86_64");
        fs::create_dir_all(&arch_dir).unwrap();
        fs::write(arch_dir.join("libmymod.so"), b"").unwrap();
        fs::write(mod_dir.join("latest"), "mymod@1.0\n").unwrap();

        let config = LoaderConfig::from_env()
            .with_search_path(vec![])
            .with_default_dir(tmp.path());
        let r = resolve(&config, "mymod", None, "x86_64", true).unwrap();
        match r {
            Resolved::Native { so_path, .. } => {
                assert!(so_path.ends_with("libmymod.so"));
            }
            _ => panic!("expected native resolution"),
        }
    }

    #[test]
    fn latest_file_missing_at_sign_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let mod_dir = tmp.path().join("mymod");
        fs::create_dir_all(&mod_dir).unwrap();
        fs::write(mod_dir.join("latest"), "garbage\n").unwrap();
        let err = read_latest_version(&mod_dir, "mymod").unwrap_err();
        assert!(matches!(err, Condition::LoadError { .. }));
    }

    #[test]
    fn missing_module_is_load_error() {
        let tmp = TempDir::new().unwrap();
        let config = LoaderConfig::from_env()
            .with_search_path(vec![])
            .with_default_dir(tmp.path());
        let err = resolve(&config, "nope", None, "x86_64", false).unwrap_err();
        assert!(matches!(err, Condition::LoadError { .. }));
    }

    #[test]
    fn load_native_reports_dlopen_failure_as_load_error() {
        let err = load_native(Path::new("/nonexistent/lib.so"), "mymod").unwrap_err();
        assert!(matches!(err, Condition::LoadError { .. }));
    }

    #[test]
    fn load_dispatches_source_without_touching_dlopen() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("mymod.idio"), "; empty\n").unwrap();
        let config = LoaderConfig::from_env()
            .with_search_path(vec![])
            .with_default_dir(tmp.path());
        let loaded = load(&config, "mymod", None, "x86_64").unwrap();
        assert!(matches!(loaded, Loaded::Source { .. }));
    }
}
