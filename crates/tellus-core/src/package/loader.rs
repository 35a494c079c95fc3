// Package resolution
//
// A process definition arrives as a literal document, a path/URL to a
// document, or a URL to a remote WPS-1 DescribeProcess. Workflows resolve
// their steps through an iterative worklist keyed by the canonical
// sub-package reference, so diamond-shaped DAGs load each package once and
// cycles are rejected.

use super::{Package, PackageClass};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// File extensions accepted for package documents
pub const PACKAGE_EXTENSIONS: &[&str] = &["yaml", "yml", "json", "cwl", "job"];

/// Synthesized artifacts of a remote WPS-1 process import
#[derive(Debug, Clone)]
pub struct ImportedProcess {
    /// Application package dispatching back to the remote provider
    pub package: Value,
    /// JSON process description parsed from the XML document
    pub description: Value,
}

/// Converts a WPS-1 DescribeProcess XML document into an equivalent package.
/// Implemented by the WPS-1 crate; the loader only detects that an import is
/// needed.
pub trait RemoteProcessImporter: Send + Sync {
    fn import_describe_process(&self, url: &str, xml: &str) -> Result<ImportedProcess>;
}

/// Resolves a bare sub-process reference (a deployed process id) to its
/// stored package document. Implemented against the process registry.
#[async_trait]
pub trait SubProcessResolver: Send + Sync {
    async fn resolve(&self, process_id: &str) -> Result<Option<Value>>;
}

/// Outcome of loading a package reference
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    pub package: Package,
    /// JSON process description when the reference was a remote WPS-1
    /// import; None for ordinary package documents
    pub imported_description: Option<Value>,
    /// Workflow step name -> resolved local sub-package file
    pub step_packages: BTreeMap<String, PathBuf>,
}

impl LoadedPackage {
    pub fn is_workflow(&self) -> bool {
        self.package.class == PackageClass::Workflow
    }
}

/// Loads and resolves package documents
pub struct PackageLoader {
    http: reqwest::Client,
    scratch_dir: PathBuf,
    importer: Option<Arc<dyn RemoteProcessImporter>>,
    resolver: Option<Arc<dyn SubProcessResolver>>,
}

impl PackageLoader {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            scratch_dir: scratch_dir.into(),
            importer: None,
            resolver: None,
        }
    }

    pub fn with_importer(mut self, importer: Arc<dyn RemoteProcessImporter>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SubProcessResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Load a literal package document
    pub async fn load_document(&self, doc: &Value) -> Result<LoadedPackage> {
        let package = Package::from_value(doc)?;
        self.finish(package, None).await
    }

    /// Load a package from a path or URL reference
    pub async fn load_reference(&self, reference: &str) -> Result<LoadedPackage> {
        let resolved = self.resolve_reference(reference).await?;
        match resolved {
            ResolvedDocument::Package(doc) => {
                let package = Package::from_value(&doc)?;
                self.finish(package, None).await
            }
            ResolvedDocument::Imported(imported) => {
                let package = Package::from_value(&imported.package)?;
                self.finish(package, Some(imported.description)).await
            }
        }
    }

    /// Validate the application hints and resolve workflow steps
    async fn finish(
        &self,
        mut package: Package,
        imported_description: Option<Value>,
    ) -> Result<LoadedPackage> {
        // surfaces multiple-application-hint conflicts at load time
        package.application_kind()?;

        let step_packages = if package.class == PackageClass::Workflow {
            // step dependency cycles are rejected here, not at execute time
            super::topological_order(package.workflow_steps()?)?;
            self.resolve_steps(&mut package).await?
        } else {
            BTreeMap::new()
        };

        Ok(LoadedPackage {
            package,
            imported_description,
            step_packages,
        })
    }

    /// Resolve every workflow step (transitively) into a scratch directory
    /// and rewrite the step `run` references to the local files.
    async fn resolve_steps(&self, root: &mut Package) -> Result<BTreeMap<String, PathBuf>> {
        let scratch = self.scratch_dir.join(format!("wf-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| EngineError::registration(format!("cannot create scratch dir: {e}")))?;

        // worklist of workflows whose steps still need resolution; the cache
        // maps canonical run references to their resolved local files, so a
        // diamond-shaped DAG loads each sub-package once
        let mut resolved: HashMap<String, PathBuf> = HashMap::new();
        let mut step_packages = BTreeMap::new();
        let mut pending: VecDeque<(Option<String>, HashSet<String>, Package)> = VecDeque::new();
        pending.push_back((None, HashSet::new(), root.clone()));

        while let Some((origin, ancestors, mut workflow)) = pending.pop_front() {
            for step in workflow.workflow_steps()? {
                let reference = step.run.clone();
                if ancestors.contains(&reference) {
                    return Err(EngineError::registration(format!(
                        "workflow step cycle through '{reference}'"
                    )));
                }
                let local = if let Some(path) = resolved.get(&reference) {
                    path.clone()
                } else {
                    let sub_doc = self.fetch_step_package(&reference).await?;
                    let sub_package = Package::from_value(&sub_doc)?;
                    sub_package.application_kind()?;
                    let file = scratch.join(format!(
                        "{}-{}.json",
                        sanitize_file_stem(&reference),
                        resolved.len()
                    ));
                    let rendered = serde_json::to_vec_pretty(&sub_package.to_value())
                        .map_err(|e| EngineError::registration(e.to_string()))?;
                    tokio::fs::write(&file, rendered).await.map_err(|e| {
                        EngineError::registration(format!("cannot write sub-package: {e}"))
                    })?;
                    if sub_package.class == PackageClass::Workflow {
                        let mut sub_ancestors = ancestors.clone();
                        sub_ancestors.insert(reference.clone());
                        pending.push_back((Some(reference.clone()), sub_ancestors, sub_package));
                    }
                    resolved.insert(reference.clone(), file.clone());
                    file
                };
                workflow.set_step_run(&step.id, &local.to_string_lossy())?;
                if origin.is_none() {
                    step_packages.insert(step.id.clone(), local);
                }
            }
            match origin {
                None => *root = workflow,
                Some(reference) => {
                    // rewrite the stored copy of a nested workflow with its
                    // now-local step references
                    if let Some(file) = resolved.get(&reference) {
                        let rendered = serde_json::to_vec_pretty(&workflow.to_value())
                            .map_err(|e| EngineError::registration(e.to_string()))?;
                        tokio::fs::write(file, rendered).await.map_err(|e| {
                            EngineError::registration(format!("cannot write sub-package: {e}"))
                        })?;
                    }
                }
            }
        }

        debug!(steps = step_packages.len(), scratch = %scratch.display(), "Resolved workflow steps");
        Ok(step_packages)
    }

    /// Fetch one step `run` reference: URL, package file, or deployed
    /// process id.
    async fn fetch_step_package(&self, reference: &str) -> Result<Value> {
        if is_url(reference) {
            return match self.resolve_reference(reference).await? {
                ResolvedDocument::Package(doc) => Ok(doc),
                ResolvedDocument::Imported(imported) => Ok(imported.package),
            };
        }
        if has_package_extension(reference) {
            return self.read_package_file(Path::new(reference)).await;
        }
        let Some(resolver) = &self.resolver else {
            return Err(EngineError::PackageNotFound(reference.to_string()));
        };
        resolver
            .resolve(reference)
            .await?
            .ok_or_else(|| EngineError::PackageNotFound(reference.to_string()))
    }

    async fn resolve_reference(&self, reference: &str) -> Result<ResolvedDocument> {
        if is_url(reference) {
            self.resolve_url(reference).await
        } else {
            self.read_package_file(Path::new(reference))
                .await
                .map(ResolvedDocument::Package)
        }
    }

    async fn resolve_url(&self, url: &str) -> Result<ResolvedDocument> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::PackageNotFound(format!("{url}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::PackageNotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(EngineError::registration(format!(
                "fetching '{url}' returned {}",
                response.status()
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::registration(format!("reading '{url}': {e}")))?;

        // remote WPS-1 process descriptions are detected by content type
        if content_type.starts_with("application/xml") || content_type.starts_with("text/xml") {
            let importer = self.importer.as_ref().ok_or_else(|| {
                EngineError::registration(format!(
                    "'{url}' is a WPS XML document but no remote importer is configured"
                ))
            })?;
            return importer
                .import_describe_process(url, &body)
                .map(ResolvedDocument::Imported);
        }

        let doc = parse_package_text(url, &body)?;
        if doc.get("cwlVersion").is_some() {
            return Ok(ResolvedDocument::Package(doc));
        }
        // process description pointing further via owsContext
        if let Some(href) = ows_context_href(&doc) {
            debug!(url, href, "Following owsContext package reference");
            return Box::pin(self.resolve_url(&href)).await;
        }
        Err(EngineError::registration(format!(
            "'{url}' holds neither a package nor a process description with an owsContext href"
        )))
    }

    async fn read_package_file(&self, path: &Path) -> Result<Value> {
        if !has_package_extension(&path.to_string_lossy()) {
            return Err(EngineError::registration(format!(
                "'{}' does not use a recognized package extension ({})",
                path.display(),
                PACKAGE_EXTENSIONS.join(", ")
            )));
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| EngineError::PackageNotFound(path.display().to_string()))?;
        parse_package_text(&path.display().to_string(), &text)
    }
}

enum ResolvedDocument {
    Package(Value),
    Imported(ImportedProcess),
}

/// Parse a package document in YAML or JSON (YAML loads JSON as well)
fn parse_package_text(origin: &str, text: &str) -> Result<Value> {
    serde_yaml::from_str::<Value>(text)
        .map_err(|e| EngineError::registration(format!("unreadable package '{origin}': {e}")))
}

fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

fn has_package_extension(reference: &str) -> bool {
    Path::new(reference.split('?').next().unwrap_or(reference))
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| PACKAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `owsContext.offering.content.href` of a process description
fn ows_context_href(doc: &Value) -> Option<String> {
    let context = doc
        .get("owsContext")
        .or_else(|| doc.get("process").and_then(|p| p.get("owsContext")))?;
    context
        .get("offering")?
        .get("content")?
        .get("href")?
        .as_str()
        .map(String::from)
}

fn sanitize_file_stem(reference: &str) -> String {
    let stem = reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches(|c: char| c == '.')
        .to_string();
    let stem = stem.split('.').next().unwrap_or(&stem);
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "package".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn loader(scratch: &Path) -> PackageLoader {
        PackageLoader::new(scratch)
    }

    fn write_tool(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        let doc = json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "true",
            "inputs": {"x": "string"},
            "outputs": {}
        });
        file.write_all(serde_json::to_string(&doc).unwrap().as_bytes())
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_literal_document() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = json!({
            "cwlVersion": "v1.0",
            "class": "CommandLineTool",
            "baseCommand": "echo",
            "inputs": {},
            "outputs": {}
        });
        let loaded = loader(tmp.path()).load_document(&doc).await.unwrap();
        assert!(!loaded.is_workflow());
        assert!(loaded.step_packages.is_empty());
    }

    #[tokio::test]
    async fn test_load_file_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_tool(tmp.path(), "tool.cwl");
        let loaded = loader(tmp.path())
            .load_reference(&path.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(loaded.package.class, PackageClass::CommandLineTool);
    }

    #[tokio::test]
    async fn test_missing_file_is_package_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = loader(tmp.path())
            .load_reference("/nowhere/missing.cwl")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_extension_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tool.txt");
        std::fs::write(&path, "cwlVersion: v1.0").unwrap();
        let err = loader(tmp.path())
            .load_reference(&path.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PackageRegistration(_)));
    }

    #[tokio::test]
    async fn test_unreadable_yaml_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.yml");
        std::fs::write(&path, "cwlVersion: v1.0\nclass: [unclosed").unwrap();
        let err = loader(tmp.path())
            .load_reference(&path.to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PackageRegistration(_)));
    }

    #[tokio::test]
    async fn test_workflow_steps_resolve_and_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let tool_a = write_tool(tmp.path(), "tool-a.cwl");
        let tool_b = write_tool(tmp.path(), "tool-b.json");
        let doc = json!({
            "cwlVersion": "v1.0",
            "class": "Workflow",
            "inputs": {"value": "string"},
            "outputs": {},
            "steps": {
                "first": {"run": tool_a.to_string_lossy(), "in": {"x": "value"}, "out": []},
                "second": {"run": tool_b.to_string_lossy(), "in": {"x": "value"}, "out": []}
            }
        });
        let loaded = loader(tmp.path()).load_document(&doc).await.unwrap();
        assert!(loaded.is_workflow());
        assert_eq!(loaded.step_packages.len(), 2);
        // step runs now point at co-located scratch copies
        for step in loaded.package.workflow_steps().unwrap() {
            assert!(step.run.ends_with(".json"), "step run: {}", step.run);
            assert!(Path::new(&step.run).exists());
        }
    }

    #[tokio::test]
    async fn test_workflow_diamond_loads_shared_step_once() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = write_tool(tmp.path(), "shared.cwl");
        let doc = json!({
            "cwlVersion": "v1.0",
            "class": "Workflow",
            "inputs": {},
            "outputs": {},
            "steps": {
                "left": {"run": shared.to_string_lossy(), "in": {}, "out": []},
                "right": {"run": shared.to_string_lossy(), "in": {}, "out": []}
            }
        });
        let loaded = loader(tmp.path()).load_document(&doc).await.unwrap();
        let paths: HashSet<_> = loaded.step_packages.values().collect();
        assert_eq!(paths.len(), 1);
    }

    #[tokio::test]
    async fn test_workflow_step_missing_process_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = json!({
            "cwlVersion": "v1.0",
            "class": "Workflow",
            "inputs": {},
            "outputs": {},
            "steps": {
                "first": {"run": "does-not-exist", "in": {}, "out": []}
            }
        });
        let err = loader(tmp.path()).load_document(&doc).await.unwrap_err();
        assert!(matches!(err, EngineError::PackageNotFound(_)));
    }
}
