//! Import Resolver.
//!
//! Fetches and merges `import "<scheme:path>"` declarations into a
//! [`Song`]'s instrument table. Fetching itself is delegated to an
//! [`ImportFetcher`] so the resolver stays testable and the network
//! transport stays swappable; a local-filesystem fetcher ships by default,
//! an HTTP(S) fetcher is available behind the `remote-import` feature.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::ast::{Instrument, Song};
use crate::error::ImportError;
use crate::parser::parse;

/// Policy governing which imports are allowed and how aggressively they're
/// bounded.
#[derive(Debug, Clone)]
pub struct ImportPolicy {
    /// URL schemes the resolver will fetch (`"file"`, `"std"`, `"https"`, ...).
    pub allowed_schemes: HashSet<String>,
    /// When true, only `https://` URLs are permitted for the `http(s)` scheme family.
    pub https_only: bool,
    /// Maximum fetched file size, in bytes.
    pub max_file_size: usize,
    /// Fetch timeout.
    pub timeout: Duration,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: ["file", "std"].iter().map(|s| s.to_string()).collect(),
            https_only: true,
            max_file_size: 1_048_576,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches the raw contents of an import URL. Implementations own the
/// transport; the resolver only ever sees bytes back.
pub trait ImportFetcher {
    /// Fetch `url`'s contents, or fail.
    fn fetch(&self, url: &str, policy: &ImportPolicy) -> Result<String, ImportError>;

    /// Canonicalize `url` to a cache key such that two URLs naming the
    /// same underlying resource normalize to the same string. Default:
    /// the URL unchanged.
    fn normalize(&self, url: &str) -> String {
        url.to_string()
    }

    /// A fetcher rooted at the directory containing `url`'s resolved
    /// location, used to resolve relative imports nested inside that
    /// file against the importing file rather than the original base
    /// directory. `None` for fetchers with no filesystem-relative
    /// notion of a containing directory (e.g. remote HTTP).
    fn rebase_for(&self, _url: &str) -> Option<Box<dyn ImportFetcher>> {
        None
    }
}

/// Resolves `file:` and bare relative paths against a base directory.
/// `std:` URLs resolve against a bundled standard-library directory
/// (treated identically to `file:` once the scheme prefix is stripped).
pub struct LocalFsFetcher {
    base_dir: PathBuf,
}

impl LocalFsFetcher {
    /// Create a fetcher resolving relative imports against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn resolve_path(&self, url: &str) -> PathBuf {
        let stripped = url.strip_prefix("file:").or_else(|| url.strip_prefix("std:")).unwrap_or(url);
        let path = Path::new(stripped);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl ImportFetcher for LocalFsFetcher {
    fn fetch(&self, url: &str, policy: &ImportPolicy) -> Result<String, ImportError> {
        let path = self.resolve_path(url);
        let metadata = std::fs::metadata(&path).map_err(|_| ImportError::NotFound(url.to_string()))?;
        if metadata.len() as usize > policy.max_file_size {
            return Err(ImportError::TooLarge { url: url.to_string(), limit: policy.max_file_size });
        }
        std::fs::read_to_string(&path).map_err(|_| ImportError::NotFound(url.to_string()))
    }

    fn normalize(&self, url: &str) -> String {
        let path = self.resolve_path(url);
        std::fs::canonicalize(&path).map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|_| path.to_string_lossy().into_owned())
    }

    fn rebase_for(&self, url: &str) -> Option<Box<dyn ImportFetcher>> {
        let parent = self.resolve_path(url).parent()?.to_path_buf();
        Some(Box::new(LocalFsFetcher::new(parent)))
    }
}

/// HTTP(S) fetcher, available only with the `remote-import` feature.
#[cfg(feature = "remote-import")]
pub struct HttpFetcher;

#[cfg(feature = "remote-import")]
impl ImportFetcher for HttpFetcher {
    fn fetch(&self, url: &str, policy: &ImportPolicy) -> Result<String, ImportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout)
            .build()
            .map_err(|e| ImportError::FetchFailed { url: url.to_string(), message: e.to_string() })?;
        let response = client
            .get(url)
            .send()
            .map_err(|e| ImportError::FetchFailed { url: url.to_string(), message: e.to_string() })?;
        if !response.status().is_success() {
            return Err(ImportError::FetchFailed { url: url.to_string(), message: response.status().to_string() });
        }
        match response.content_length() {
            Some(len) if len as usize > policy.max_file_size => {
                return Err(ImportError::TooLarge { url: url.to_string(), limit: policy.max_file_size });
            }
            _ => {}
        }
        response.text().map_err(|e| ImportError::FetchFailed { url: url.to_string(), message: e.to_string() })
    }
}

fn scheme_of(url: &str) -> &str {
    url.split_once(':').map(|(scheme, _)| scheme).unwrap_or("file")
}

fn check_policy(url: &str, policy: &ImportPolicy) -> Result<(), ImportError> {
    let scheme = scheme_of(url);
    if !policy.allowed_schemes.contains(scheme) {
        return Err(ImportError::SchemeDisallowed(scheme.to_string()));
    }
    if scheme == "http" && policy.https_only {
        return Err(ImportError::InsecureUrl(url.to_string()));
    }
    Ok(())
}

/// A resolved import's instrument table, cached by normalized URL so a
/// diamond of imports (two different files importing the same `.ins`)
/// fetches and parses it only once.
struct CachedImport {
    insts: HashMap<String, Instrument>,
    /// When this URL was fetched, for diagnostics.
    #[allow(dead_code)]
    fetched_at: SystemTime,
}

/// Resolve every `import` declaration in `song`, merging each imported
/// file's `inst` declarations into `song.insts`. Imported files may
/// themselves only contain `inst` declarations; local (`file:`/`std:`)
/// imports may additionally contain further `import`s, which resolve
/// relative to the importing file rather than the original base
/// directory. Remote imports may not nest further imports.
pub fn resolve_imports(song: &mut Song, fetcher: &dyn ImportFetcher, policy: &ImportPolicy) -> Result<(), ImportError> {
    let mut stack = HashSet::new();
    let mut cache = HashMap::new();
    let imports = song.imports.clone();
    for import in imports {
        resolve_one(song, &import.url, fetcher, policy, &mut stack, &mut cache)?;
    }
    Ok(())
}

fn resolve_one(
    song: &mut Song,
    url: &str,
    fetcher: &dyn ImportFetcher,
    policy: &ImportPolicy,
    stack: &mut HashSet<String>,
    cache: &mut HashMap<String, CachedImport>,
) -> Result<(), ImportError> {
    let key = fetcher.normalize(url);

    if let Some(cached) = cache.get(&key) {
        merge_insts(song, &cached.insts);
        return Ok(());
    }

    if !stack.insert(key.clone()) {
        return Err(ImportError::Cycle(url.to_string()));
    }
    let result = resolve_one_uncached(song, url, &key, fetcher, policy, stack, cache);
    stack.remove(&key);
    result
}

fn resolve_one_uncached(
    song: &mut Song,
    url: &str,
    key: &str,
    fetcher: &dyn ImportFetcher,
    policy: &ImportPolicy,
    stack: &mut HashSet<String>,
    cache: &mut HashMap<String, CachedImport>,
) -> Result<(), ImportError> {
    check_policy(url, policy)?;
    let source = fetcher.fetch(url, policy)?;
    let imported = parse(&source).map_err(|source| ImportError::Parse { url: url.to_string(), source })?;

    let is_local = matches!(scheme_of(url), "file" | "std");

    if !imported.pats.is_empty()
        || !imported.seqs.is_empty()
        || !imported.channels.is_empty()
        || imported.play.is_some()
        || !imported.exports.is_empty()
        || (!is_local && !imported.imports.is_empty())
    {
        return Err(ImportError::RemoteContainsNonInst(url.to_string()));
    }

    if is_local && !imported.imports.is_empty() {
        let rebased = fetcher.rebase_for(url);
        let nested_fetcher = rebased.as_deref().unwrap_or(fetcher);
        for nested in &imported.imports {
            resolve_one(song, &nested.url, nested_fetcher, policy, stack, cache)?;
        }
    }

    merge_insts(song, &imported.insts);
    cache.insert(key.to_string(), CachedImport { insts: imported.insts, fetched_at: SystemTime::now() });

    Ok(())
}

fn merge_insts(song: &mut Song, insts: &HashMap<String, Instrument>) {
    for (name, inst) in insts {
        song.insts.entry(name.clone()).or_insert_with(|| inst.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn merges_instrument_only_import() {
        let dir = std::env::temp_dir().join(format!("beatbax-import-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("drums.ins");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, "inst kick type=noise").unwrap();

        let mut song = parse(&format!("import \"file:{}\"\ninst lead type=pulse1", file_path.display())).unwrap();
        let fetcher = LocalFsFetcher::new(&dir);
        let policy = ImportPolicy::default();
        resolve_imports(&mut song, &fetcher, &policy).unwrap();

        assert!(song.insts.contains_key("kick"));
        assert!(song.insts.contains_key("lead"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_disallowed_scheme() {
        let mut song = parse("import \"ftp://example.com/x.ins\"").unwrap();
        let fetcher = LocalFsFetcher::new(".");
        let policy = ImportPolicy::default();
        let err = resolve_imports(&mut song, &fetcher, &policy).unwrap_err();
        assert!(matches!(err, ImportError::SchemeDisallowed(_)));
    }

    #[test]
    fn rejects_import_containing_non_inst_content() {
        let dir = std::env::temp_dir().join(format!("beatbax-import-test2-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("bad.ins");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, "pat p = C4").unwrap();

        let mut song = parse(&format!("import \"file:{}\"", file_path.display())).unwrap();
        let fetcher = LocalFsFetcher::new(&dir);
        let policy = ImportPolicy::default();
        let err = resolve_imports(&mut song, &fetcher, &policy).unwrap_err();
        assert!(matches!(err, ImportError::RemoteContainsNonInst(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn nested_local_import_resolves_relative_to_the_importing_file() {
        let dir = std::env::temp_dir().join(format!("beatbax-import-test3-{}", std::process::id()));
        let libs = dir.join("libs");
        std::fs::create_dir_all(&libs).unwrap();
        std::fs::write(libs.join("a.ins"), "import \"b.ins\"\ninst from_a type=pulse1").unwrap();
        std::fs::write(libs.join("b.ins"), "inst from_b type=wave").unwrap();

        // base_dir is `dir`, not `dir/libs` — `b.ins` only exists relative
        // to `a.ins`'s own directory, not the song's original base_dir.
        let mut song = parse(&format!("import \"file:{}\"\ninst lead type=pulse1", libs.join("a.ins").display())).unwrap();
        let fetcher = LocalFsFetcher::new(&dir);
        let policy = ImportPolicy::default();
        resolve_imports(&mut song, &fetcher, &policy).unwrap();

        assert!(song.insts.contains_key("from_a"));
        assert!(song.insts.contains_key("from_b"));
        assert!(song.insts.contains_key("lead"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn diamond_import_of_the_same_file_is_not_a_false_cycle() {
        let dir = std::env::temp_dir().join(format!("beatbax-import-test4-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("common.ins"), "inst shared type=noise").unwrap();
        std::fs::write(dir.join("a.ins"), "import \"common.ins\"\ninst from_a type=pulse1").unwrap();
        std::fs::write(dir.join("b.ins"), "import \"common.ins\"\ninst from_b type=pulse2").unwrap();

        let mut song = parse(&format!(
            "import \"file:{}\"\nimport \"file:{}\"",
            dir.join("a.ins").display(),
            dir.join("b.ins").display()
        ))
        .unwrap();
        let fetcher = LocalFsFetcher::new(&dir);
        let policy = ImportPolicy::default();
        resolve_imports(&mut song, &fetcher, &policy).unwrap();

        assert!(song.insts.contains_key("shared"));
        assert!(song.insts.contains_key("from_a"));
        assert!(song.insts.contains_key("from_b"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn genuine_import_cycle_is_still_rejected() {
        let dir = std::env::temp_dir().join(format!("beatbax-import-test5-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a2.ins"), "import \"b2.ins\"\ninst from_a type=pulse1").unwrap();
        std::fs::write(dir.join("b2.ins"), "import \"a2.ins\"\ninst from_b type=pulse2").unwrap();

        let mut song = parse(&format!("import \"file:{}\"", dir.join("a2.ins").display())).unwrap();
        let fetcher = LocalFsFetcher::new(&dir);
        let policy = ImportPolicy::default();
        let err = resolve_imports(&mut song, &fetcher, &policy).unwrap_err();
        assert!(matches!(err, ImportError::Cycle(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    struct FixedFetcher {
        content: HashMap<String, String>,
    }

    impl ImportFetcher for FixedFetcher {
        fn fetch(&self, url: &str, _policy: &ImportPolicy) -> Result<String, ImportError> {
            self.content.get(url).cloned().ok_or_else(|| ImportError::NotFound(url.to_string()))
        }
    }

    #[test]
    fn remote_scheme_still_rejects_nested_imports() {
        let mut content = HashMap::new();
        content.insert("mem:root".to_string(), "import \"mem:child\"".to_string());
        content.insert("mem:child".to_string(), "inst x type=noise".to_string());
        let fetcher = FixedFetcher { content };

        let mut song = parse("import \"mem:root\"").unwrap();
        let mut policy = ImportPolicy::default();
        policy.allowed_schemes.insert("mem".to_string());
        let err = resolve_imports(&mut song, &fetcher, &policy).unwrap_err();
        assert!(matches!(err, ImportError::RemoteContainsNonInst(_)));
    }
}
