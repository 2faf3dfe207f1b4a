use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot find module '{request}' from '{}'", base.display())]
    ModuleNotFound { request: String, base: PathBuf },
    #[error("failed resolving '{request}': {source}")]
    Io {
        request: String,
        #[source]
        source: io::Error,
    },
}

/// Resolves `request` the way a package-local `require` would from `base`.
///
/// Relative requests are joined to `base`. Bare requests look for
/// `node_modules/<package>` in `base` and each ancestor, then append the
/// remaining subpath. Each candidate is tried as a file, as the file with a
/// `.json` suffix, and as a directory holding `index.json`.
pub fn resolve_module(request: &str, base: &Path) -> Result<PathBuf, ResolveError> {
    let request = request.replace('\\', "/");
    if request.starts_with("./") || request.starts_with("../") || request == "." {
        return probe_candidates(&base.join(&request))
            .map_err(|source| ResolveError::Io {
                request: request.clone(),
                source,
            })?
            .ok_or_else(|| ResolveError::ModuleNotFound {
                request: request.clone(),
                base: base.to_path_buf(),
            });
    }

    let (package, subpath) = split_bare_request(&request);
    for directory in base.ancestors() {
        if directory.file_name().is_some_and(|name| name == "node_modules") {
            continue;
        }
        let package_dir = directory.join("node_modules").join(package);
        if !package_dir.is_dir() {
            continue;
        }
        let candidate = match subpath {
            Some(subpath) => package_dir.join(subpath),
            None => package_dir,
        };
        let resolved = probe_candidates(&candidate).map_err(|source| ResolveError::Io {
            request: request.clone(),
            source,
        })?;
        if let Some(resolved) = resolved {
            return Ok(resolved);
        }
    }

    Err(ResolveError::ModuleNotFound {
        request,
        base: base.to_path_buf(),
    })
}

/// Directory of an installed package, found through its `package.json`.
pub fn resolve_package_dir(package: &str, base: &Path) -> Result<PathBuf, ResolveError> {
    let manifest = resolve_module(&format!("{package}/package.json"), base)?;
    Ok(manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base.to_path_buf()))
}

fn split_bare_request(request: &str) -> (&str, Option<&str>) {
    let mut separators = request.match_indices('/').map(|(index, _)| index);
    let boundary = if request.starts_with('@') {
        separators.nth(1)
    } else {
        separators.next()
    };
    match boundary {
        Some(index) => (&request[..index], Some(&request[index + 1..])),
        None => (request, None),
    }
}

fn probe_candidates(candidate: &Path) -> io::Result<Option<PathBuf>> {
    let candidate = normalize_lexically(candidate);
    if is_regular_file(&candidate)? {
        return Ok(Some(candidate));
    }

    let mut with_json = candidate.clone().into_os_string();
    with_json.push(".json");
    let with_json = PathBuf::from(with_json);
    if is_regular_file(&with_json)? {
        return Ok(Some(with_json));
    }

    let index = candidate.join("index.json");
    if candidate.is_dir() && is_regular_file(&index)? {
        return Ok(Some(index));
    }

    Ok(None)
}

fn is_regular_file(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
