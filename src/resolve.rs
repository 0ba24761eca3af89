//! # Import/Reference Resolver
//!
//! Resolves `@import`, `@ref`/`@forceRef` and scoped variable visibility
//! across documents. Target documents are parsed through a [`FileLoader`]
//! and cached per path for the duration of one resolution run; a path that
//! re-enters the active import stack is a hard cycle error. `@ref` grafts the
//! referenced region's request execution and its locally scoped variables
//! into the current execution; `@forceRef` additionally bypasses selection
//! filters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::document::{Document, Region};
use crate::parser::{self, context::join_path};
use crate::variables::VariableSet;

/// Reads request-definition files for the resolver and the GraphQL loader.
/// Tests inject an in-memory implementation.
#[async_trait]
pub trait FileLoader: Send + Sync {
    async fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Loader over the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

#[async_trait]
impl FileLoader for FsLoader {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("import not found: {path}")]
    UnresolvedImport { path: PathBuf },
    #[error("reference not found: {name}")]
    UnresolvedReference { name: String },
    #[error("reference is ambiguous: {name}")]
    AmbiguousReference { name: String },
    #[error("import cycle detected at {path}")]
    ImportCycle { path: PathBuf },
}

/// A referenced region grafted into the current execution, together with the
/// variable scope it executes under.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    pub region: Region,
    pub variables: VariableSet,
    /// True for `@forceRef`: the region runs even when a selection filter
    /// would skip it.
    pub force: bool,
}

/// Result of resolving one region for execution.
#[derive(Debug, Clone)]
pub struct ResolvedExecution {
    /// Global scope visible to the region: own-file globals plus globals of
    /// transitively imported documents. The caller overlays region locals
    /// last, after grafted references contribute theirs.
    pub variables: VariableSet,
    /// Referenced regions, in declaration order, depth-first.
    pub prerequisites: Vec<ResolvedRef>,
}

/// One resolution run. The parse cache lives as long as the resolver.
pub struct Resolver {
    loader: Arc<dyn FileLoader>,
    cache: HashMap<PathBuf, Arc<Document>>,
}

impl Resolver {
    pub fn new(loader: Arc<dyn FileLoader>) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
        }
    }

    /// Resolves imports, references and variable scope for one region of
    /// `document`.
    pub async fn resolve(
        &mut self,
        document: &Document,
        region_index: usize,
    ) -> Result<ResolvedExecution, ResolveError> {
        let mut stack = vec![document.path.clone()];
        let mut visited = Vec::new();
        let imported = self
            .load_imports(document, &mut stack, &mut visited)
            .await?;

        let mut variables = VariableSet::new();
        for doc in &imported {
            variables.extend_text(doc.global_variables());
        }
        variables.extend_text(document.global_variables());

        let region = &document.regions[region_index];
        let mut prerequisites = Vec::new();
        let mut visited = Vec::new();
        self.collect_refs(document, &imported, region, &mut visited, &mut prerequisites)?;

        Ok(ResolvedExecution {
            variables,
            prerequisites,
        })
    }

    /// Loads and parses the transitive import closure of `document`.
    /// `stack` holds the active import chain for cycle detection; `visited`
    /// holds every path already in the closure, so a document reachable via
    /// several import paths enters it exactly once.
    async fn load_imports(
        &mut self,
        document: &Document,
        stack: &mut Vec<PathBuf>,
        visited: &mut Vec<PathBuf>,
    ) -> Result<Vec<Arc<Document>>, ResolveError> {
        let mut imported = Vec::new();
        for path in document.import_paths() {
            let resolved = join_path(document.dir(), path);
            if stack.contains(&resolved) {
                return Err(ResolveError::ImportCycle { path: resolved });
            }
            if visited.contains(&resolved) {
                continue;
            }
            visited.push(resolved.clone());
            let doc = match self.cache.get(&resolved) {
                Some(doc) => Arc::clone(doc),
                None => {
                    debug!(path = %resolved.display(), "parsing imported document");
                    let text = self.loader.read(&resolved).await.map_err(|_| {
                        ResolveError::UnresolvedImport {
                            path: resolved.clone(),
                        }
                    })?;
                    let doc = Arc::new(parser::parse(&resolved, &text));
                    self.cache.insert(resolved.clone(), Arc::clone(&doc));
                    doc
                }
            };
            stack.push(resolved);
            let nested = Box::pin(self.load_imports(&doc, stack, visited)).await?;
            stack.pop();
            imported.extend(nested);
            imported.push(doc);
        }
        Ok(imported)
    }

    /// Locates each `@ref`/`@forceRef` of `region` across the own file and
    /// the imported global scope, depth-first, each named region at most
    /// once.
    fn collect_refs(
        &self,
        document: &Document,
        imported: &[Arc<Document>],
        region: &Region,
        visited: &mut Vec<String>,
        out: &mut Vec<ResolvedRef>,
    ) -> Result<(), ResolveError> {
        for reference in &region.refs {
            if visited.iter().any(|name| name == &reference.name) {
                continue;
            }
            visited.push(reference.name.clone());

            let (owner, target) = self.find_region(document, imported, &reference.name)?;
            self.collect_refs(owner, imported, target, visited, out)?;

            let mut variables = VariableSet::new();
            variables.extend_text(owner.global_variables());
            variables.extend_text(target.variables.iter().cloned());
            out.push(ResolvedRef {
                region: target.clone(),
                variables,
                force: reference.force,
            });
        }
        Ok(())
    }

    /// A named reference must resolve to exactly one visible region.
    fn find_region<'a>(
        &self,
        document: &'a Document,
        imported: &'a [Arc<Document>],
        name: &str,
    ) -> Result<(&'a Document, &'a Region), ResolveError> {
        let mut matches: Vec<(&Document, &Region)> = Vec::new();
        for region in &document.regions {
            if region.matches_name(name) {
                matches.push((document, region));
            }
        }
        for doc in imported {
            for region in &doc.regions {
                if region.matches_name(name) {
                    matches.push((doc.as_ref(), region));
                }
            }
        }
        match matches.len() {
            0 => Err(ResolveError::UnresolvedReference {
                name: name.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(ResolveError::AmbiguousReference {
                name: name.to_string(),
            }),
        }
    }
}
