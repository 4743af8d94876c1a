//! Module loader for `import` / `from ... import`
//!
//! Resolves a module name to a `.fine` file, parses it and caches the
//! evaluated exports scope by name. Evaluation itself belongs to the
//! interpreter: a load is bracketed by [`ModuleLoader::begin`] and
//! [`ModuleLoader::finish`] (or [`ModuleLoader::abandon`] on failure) so that
//! circular imports are detected while a module is still running.

use super::env::EnvRef;
use super::value::Module;
use crate::ast::Program;
use crate::error::CompileError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

/// Source file extension for modules
pub const MODULE_EXTENSION: &str = "fine";

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("cannot import module '{name}'")]
    NotFound { name: String, tried: Vec<PathBuf> },

    #[error("cannot import module '{name}': {error}")]
    Read {
        name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("in module '{name}': {error}")]
    Parse {
        name: String,
        #[source]
        error: CompileError,
    },

    #[error("circular import of module '{name}'")]
    Circular { name: String },
}

/// A module that has been read and parsed but not yet evaluated
#[derive(Debug)]
pub struct ModuleSource {
    pub name: String,
    pub path: PathBuf,
    pub program: Program,
}

/// Module cache plus the set of modules currently being evaluated
#[derive(Debug)]
pub struct ModuleLoader {
    stdlib_dir: PathBuf,
    modules: HashMap<String, Rc<Module>>,
    /// Modules whose top level is running, outermost first
    loading: Vec<String>,
}

impl ModuleLoader {
    pub fn new(stdlib_dir: impl Into<PathBuf>) -> Self {
        Self {
            stdlib_dir: stdlib_dir.into(),
            modules: HashMap::new(),
            loading: Vec::new(),
        }
    }

    /// A previously loaded module
    pub fn get(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolve a module name to a file path.
    ///
    /// Names starting with `.` or `/` are paths: `{name}.fine`, relative ones
    /// taken against `base_dir`. Bare names try the stdlib directory, then
    /// `base_dir`, then the working directory.
    pub fn resolve(&self, name: &str, base_dir: Option<&Path>) -> Result<PathBuf, ModuleError> {
        let file = format!("{name}.{MODULE_EXTENSION}");
        let candidates: Vec<PathBuf> = if is_path_name(name) {
            match base_dir {
                Some(base) if name.starts_with('.') => vec![base.join(&file)],
                _ => vec![PathBuf::from(&file)],
            }
        } else {
            let mut paths = vec![self.stdlib_dir.join(&file)];
            if let Some(base) = base_dir {
                paths.push(base.join(&file));
            }
            paths.push(PathBuf::from(&file));
            paths
        };

        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(ModuleError::NotFound {
                name: name.to_string(),
                tried: candidates,
            }),
        }
    }

    /// Start loading `name`: resolve, read and parse it, and mark it as in
    /// progress. Fails if the module is already being loaded further up.
    pub fn begin(&mut self, name: &str, base_dir: Option<&Path>) -> Result<ModuleSource, ModuleError> {
        if self.loading.iter().any(|m| m == name) {
            return Err(ModuleError::Circular {
                name: name.to_string(),
            });
        }

        let path = self.resolve(name, base_dir)?;
        let source = std::fs::read_to_string(&path).map_err(|error| ModuleError::Read {
            name: name.to_string(),
            error,
        })?;
        let program = crate::parser::parse_source(&source).map_err(|error| ModuleError::Parse {
            name: name.to_string(),
            error,
        })?;

        tracing::debug!(module = name, path = %path.display(), "module parsed");
        self.loading.push(name.to_string());
        Ok(ModuleSource {
            name: name.to_string(),
            path,
            program,
        })
    }

    /// Record a fully evaluated module in the cache
    pub fn finish(&mut self, name: &str, exports: EnvRef) -> Rc<Module> {
        self.loading.retain(|m| m != name);
        let module = Rc::new(Module {
            name: name.to_string(),
            exports,
        });
        self.modules.insert(name.to_string(), Rc::clone(&module));
        module
    }

    /// Drop an in-progress load whose evaluation failed
    pub fn abandon(&mut self, name: &str) {
        self.loading.retain(|m| m != name);
    }
}

fn is_path_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('/')
}

/// Name bound by `import name`: the name itself, or the file stem for paths
pub fn binding_name(name: &str) -> &str {
    if is_path_name(name) {
        Path::new(name)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::env::Environment;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_binding_name() {
        assert_eq!(binding_name("math"), "math");
        assert_eq!(binding_name("./lib/helpers"), "helpers");
        assert_eq!(binding_name("/abs/util"), "util");
    }

    #[test]
    fn test_resolve_prefers_stdlib() {
        let dir = tempfile::tempdir().unwrap();
        let stdlib = dir.path().join("stdlib");
        let expected = write(&stdlib, "math.fine", "let pi = 3");
        write(dir.path(), "math.fine", "let pi = 4");

        let loader = ModuleLoader::new(&stdlib);
        assert_eq!(loader.resolve("math", Some(dir.path())).unwrap(), expected);
    }

    #[test]
    fn test_resolve_relative_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("./lib/helpers.fine");
        write(dir.path(), "lib/helpers.fine", "let x = 1");

        let loader = ModuleLoader::new(dir.path().join("stdlib"));
        assert_eq!(loader.resolve("./lib/helpers", Some(dir.path())).unwrap(), expected);
    }

    #[test]
    fn test_resolve_missing() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ModuleLoader::new(dir.path().join("stdlib"));
        let err = loader.resolve("nope_not_here", Some(dir.path())).unwrap_err();
        assert_eq!(err.to_string(), "cannot import module 'nope_not_here'");
        assert!(matches!(err, ModuleError::NotFound { tried, .. } if tried.len() == 3));
    }

    #[test]
    fn test_begin_parses_and_tracks_loading() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "util.fine", "export fn twice(x) { return x * 2 }");
        let mut loader = ModuleLoader::new(dir.path().join("stdlib"));

        let source = loader.begin("util", Some(dir.path())).unwrap();
        assert_eq!(source.program.stmts.len(), 1);

        let err = loader.begin("util", Some(dir.path())).unwrap_err();
        assert!(matches!(err, ModuleError::Circular { .. }));

        let module = loader.finish("util", Environment::new().into_ref());
        assert_eq!(module.name, "util");
        assert!(Rc::ptr_eq(&loader.get("util").unwrap(), &module));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_begin_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.fine", "let = 1");
        let mut loader = ModuleLoader::new(dir.path().join("stdlib"));
        let err = loader.begin("broken", Some(dir.path())).unwrap_err();
        assert!(matches!(err, ModuleError::Parse { .. }));
        assert!(err.to_string().starts_with("in module 'broken':"));

        // A failed parse never enters the loading set
        write(dir.path(), "broken.fine", "let y = 1");
        assert!(loader.begin("broken", Some(dir.path())).is_ok());
    }

    #[test]
    fn test_abandon_allows_retry() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m.fine", "let a = 1");
        let mut loader = ModuleLoader::new(dir.path().join("stdlib"));
        loader.begin("m", Some(dir.path())).unwrap();
        loader.abandon("m");
        assert!(loader.begin("m", Some(dir.path())).is_ok());
        assert!(loader.is_empty());
    }
}
