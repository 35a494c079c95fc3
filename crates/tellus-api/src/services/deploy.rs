// Process deployment service
//
// Validates the deploy payload, resolves the package (and sub-packages,
// through the loader), merges deploy-supplied metadata with the
// package-derived I/O, and persists the process. Workflows deploy only
// when the engine plays the EMS role.

use serde_json::Value;
use std::sync::Arc;
use tellus_core::{
    io_from_json, merge_io_descriptions, validate_identifier, EngineConfig, EngineError,
    IoDescription, LoadedPackage, Metadata, Process, ProcessType, Result, Visibility,
};
use tellus_worker::ExecutionEngine;
use tracing::info;

pub struct ProcessService {
    engine: Arc<ExecutionEngine>,
}

impl ProcessService {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }

    fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Seed the builtin processes; failures on duplicates are expected on
    /// restart with a persistent store.
    pub async fn seed_builtins(&self) {
        for process in tellus_worker::builtin::builtin_processes() {
            let id = process.id.clone();
            match self
                .engine
                .repos()
                .processes
                .save_process(process, true)
                .await
            {
                Ok(()) => info!(process = %id, "Seeded builtin process"),
                Err(e) => tracing::warn!(process = %id, error = %e, "Cannot seed builtin"),
            }
        }
    }

    /// Deploy a process from its payload document
    pub async fn deploy(&self, payload: Value, overwrite: bool) -> Result<Process> {
        let process_desc = payload
            .get("processDescription")
            .and_then(|d| d.get("process"))
            .ok_or_else(|| {
                EngineError::registration("deploy payload is missing processDescription.process")
            })?;
        let id = process_desc
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                EngineError::registration("deploy payload carries no process id")
            })?
            .to_string();
        validate_identifier(&id)?;

        let loaded = self.resolve_execution_unit(&payload).await?;
        let process_type = if loaded.is_workflow() {
            if !self.config().role.accepts_workflows() {
                return Err(EngineError::package_type(
                    "workflow deployment requires the EMS role",
                ));
            }
            ProcessType::Workflow
        } else if loaded.imported_description.is_some() {
            ProcessType::RemoteWps
        } else {
            ProcessType::Application
        };

        // package wins on type and formats, the payload on everything else
        let package_inputs = loaded.package.input_descriptions()?;
        let package_outputs = loaded.package.output_descriptions()?;
        let payload_inputs = payload_io(process_desc, "inputs")?;
        let payload_outputs = payload_io(process_desc, "outputs")?;
        let inputs = merge_io_descriptions(package_inputs, &payload_inputs);
        let outputs = merge_io_descriptions(package_outputs, &payload_outputs);

        let mut process = Process::new(&id, process_type)?.with_io(inputs, outputs)?;
        process.title = process_desc
            .get("title")
            .and_then(Value::as_str)
            .map(String::from);
        process.abstract_ = process_desc
            .get("abstract")
            .and_then(Value::as_str)
            .map(String::from);
        process.version = payload
            .get("processDescription")
            .and_then(|d| d.get("processVersion"))
            .and_then(Value::as_str)
            .map(String::from);
        process.keywords = process_desc
            .get("keywords")
            .and_then(Value::as_array)
            .map(|kw| {
                kw.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        process.metadata = process_desc
            .get("metadata")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|m| serde_json::from_value::<Metadata>(m.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        process.visibility = process_desc
            .get("visibility")
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Visibility::Private);
        process.package = loaded.package.to_value();
        process.payload = payload;
        process.execute_endpoint = Some(format!(
            "{}/processes/{id}/jobs",
            self.config().base_url.trim_end_matches('/')
        ));

        self.engine
            .repos()
            .processes
            .save_process(process.clone(), overwrite)
            .await?;
        info!(process = %process.id, kind = ?process.process_type, "Process deployed");
        Ok(process)
    }

    /// Resolve the deploy payload's execution unit into a loaded package.
    ///
    /// Exactly one of `executionUnit` and an `owsContext` href is accepted;
    /// both at once is invalid.
    async fn resolve_execution_unit(&self, payload: &Value) -> Result<LoadedPackage> {
        let execution_unit = payload.get("executionUnit").and_then(Value::as_array);
        let ows_href = payload
            .get("processDescription")
            .and_then(|d| d.get("process"))
            .and_then(|p| p.get("owsContext"))
            .and_then(|c| c.get("offering"))
            .and_then(|o| o.get("content"))
            .and_then(|c| c.get("href"))
            .and_then(Value::as_str);

        match (execution_unit, ows_href) {
            (Some(_), Some(_)) => Err(EngineError::registration(
                "deploy payload carries both executionUnit and owsContext",
            )),
            (Some(units), None) => {
                let unit = units.first().ok_or_else(|| {
                    EngineError::registration("executionUnit list is empty")
                })?;
                if let Some(doc) = unit.get("unit") {
                    self.engine.loader().load_document(doc).await
                } else if let Some(href) = unit.get("href").and_then(Value::as_str) {
                    self.engine.loader().load_reference(href).await
                } else {
                    Err(EngineError::registration(
                        "executionUnit entries need 'unit' or 'href'",
                    ))
                }
            }
            (None, Some(href)) => self.engine.loader().load_reference(href).await,
            (None, None) => Err(EngineError::registration(
                "deploy payload carries neither executionUnit nor owsContext",
            )),
        }
    }

    pub async fn list(&self, visibility: Option<Visibility>) -> Result<Vec<Process>> {
        self.engine.repos().processes.list_processes(visibility).await
    }

    pub async fn fetch(&self, process_id: &str) -> Result<Process> {
        self.engine
            .repos()
            .processes
            .fetch_by_id(process_id)
            .await?
            .ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))
    }

    /// Undeploy; builtin processes are protected
    pub async fn undeploy(&self, process_id: &str) -> Result<()> {
        let process = self.fetch(process_id).await?;
        if process.is_builtin() {
            return Err(EngineError::ProcessNotAccessible(format!(
                "builtin process '{process_id}' cannot be undeployed"
            )));
        }
        self.engine
            .repos()
            .processes
            .delete_process(process_id)
            .await?;
        info!(process = %process_id, "Process undeployed");
        Ok(())
    }

    pub async fn get_visibility(&self, process_id: &str) -> Result<Visibility> {
        self.engine
            .repos()
            .processes
            .get_visibility(process_id)
            .await?
            .ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))
    }

    /// Change visibility; builtin processes are protected
    pub async fn set_visibility(
        &self,
        process_id: &str,
        visibility: Visibility,
    ) -> Result<Visibility> {
        let process = self.fetch(process_id).await?;
        if process.is_builtin() {
            return Err(EngineError::ProcessNotAccessible(format!(
                "visibility of builtin process '{process_id}' cannot change"
            )));
        }
        self.engine
            .repos()
            .processes
            .set_visibility(process_id, visibility)
            .await?;
        Ok(visibility)
    }
}

fn payload_io(process_desc: &Value, section: &str) -> Result<Vec<IoDescription>> {
    process_desc
        .get(section)
        .and_then(Value::as_array)
        .map(|list| list.iter().map(io_from_json).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}
