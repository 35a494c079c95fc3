// Execution dispatcher
//
// For a job, selects the backend from the loaded package's application
// hints, runs the computation, and streams status back through the job's
// progress channel. Workflow packages delegate to the step engine, which
// recurses back through execute_package per step.

use crate::marshal::{self, ResolvedInput};
use crate::queue::CancelToken;
use crate::tracker::ProgressSender;
use crate::{builtin, docker, esgf, opensearch, workflow, wps1};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tellus_core::status::{
    PROGRESS_COLLECT_OUTPUT, PROGRESS_CONVERT_INPUT, PROGRESS_LAUNCH, PROGRESS_LOAD,
};
use tellus_core::{
    ApplicationKind, EngineConfig, EngineError, IoDescription, JobStatus, LoadedPackage,
    PackageLoader, Result, SubProcessResolver,
};
use tellus_storage::{ProcessStore, Repositories};
use tellus_wps1::Wps1Importer;
use tracing::info;
use uuid::Uuid;

/// Resolves bare workflow step references against the process registry
struct RegistryResolver {
    processes: Arc<dyn ProcessStore>,
}

#[async_trait]
impl SubProcessResolver for RegistryResolver {
    async fn resolve(&self, process_id: &str) -> Result<Option<Value>> {
        let process = self.processes.fetch_by_id(process_id).await?;
        Ok(process.and_then(|p| {
            if p.package.is_null() {
                None
            } else {
                Some(p.package)
            }
        }))
    }
}

/// The per-job execution engine shared by all workers
pub struct ExecutionEngine {
    config: EngineConfig,
    repos: Repositories,
    loader: PackageLoader,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, repos: Repositories) -> Arc<Self> {
        let loader = PackageLoader::new(config.scratch_dir.clone())
            .with_importer(Arc::new(Wps1Importer::new()))
            .with_resolver(Arc::new(RegistryResolver {
                processes: repos.processes.clone(),
            }));
        Arc::new(Self {
            config,
            repos,
            loader,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    pub fn loader(&self) -> &PackageLoader {
        &self.loader
    }

    /// Execute one job end to end, streaming progress through `progress`.
    /// Returns the job results on success.
    pub async fn run_job(
        &self,
        job_id: Uuid,
        progress: &ProgressSender,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>> {
        let job = self
            .repos
            .jobs
            .fetch_by_id(job_id)
            .await?
            .ok_or(EngineError::JobNotFound(job_id))?;
        progress.send(JobStatus::Running, PROGRESS_LAUNCH, "Launching package...");

        let process = match &job.service {
            // provider jobs import the remote process on the fly
            Some(service) => self.import_service_process(service, &job.process).await?,
            None => self
                .repos
                .processes
                .fetch_by_id(&job.process)
                .await?
                .ok_or_else(|| EngineError::ProcessNotFound(job.process.clone()))?,
        };
        let loaded = self.loader.load_document(&process.package).await?;
        progress.send(
            JobStatus::Running,
            PROGRESS_LOAD,
            "Loading package content done.",
        );

        let raw_inputs = opensearch::resolve_eo_inputs(&process, &job.inputs, &self.config).await?;
        let inputs = marshal::marshal_inputs(&process.inputs, &raw_inputs)?;
        progress.send(
            JobStatus::Running,
            PROGRESS_CONVERT_INPUT,
            "Convert package inputs done.",
        );

        let workdir = self.config.output_dir.join(job_id.to_string()).join("work");
        let produced = self
            .execute_package(&loaded, inputs, &process.outputs, &workdir, progress, cancel)
            .await?;

        progress.send(
            JobStatus::Running,
            PROGRESS_COLLECT_OUTPUT,
            "Generate package outputs done.",
        );
        marshal::collect_outputs(&process.outputs, &produced, &self.config, &job_id)
    }

    /// Synthesize a process for a job dispatched through a registered
    /// provider: DescribeProcess is imported and the resulting package
    /// dispatches back to the provider.
    async fn import_service_process(
        &self,
        service_name: &str,
        process_id: &str,
    ) -> Result<tellus_core::Process> {
        let service = self
            .repos
            .services
            .fetch_by_name(service_name)
            .await?
            .ok_or_else(|| EngineError::ServiceNotFound(service_name.to_string()))?;
        let client = tellus_wps1::Wps1Client::with_timeouts(
            &service.url,
            self.config.connect_timeout,
            self.config.read_timeout,
        )?;
        let xml = client.describe_process_xml(process_id).await?;
        let imported = Wps1Importer::new().import(&service.url, &xml)?;

        let id = imported
            .description
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))?
            .to_string();
        let inputs = io_list(&imported.description, "inputs")?;
        let outputs = io_list(&imported.description, "outputs")?;
        let mut process = tellus_core::Process::new(id, tellus_core::ProcessType::RemoteWps)?
            .with_io(inputs, outputs)?;
        process.package = imported.package;
        process.execute_endpoint = Some(service.url.clone());
        Ok(process)
    }

    /// Dispatch one loaded package to its backend. Boxed so the workflow
    /// engine can recurse through it per step.
    pub fn execute_package<'a>(
        &'a self,
        loaded: &'a LoadedPackage,
        inputs: Vec<ResolvedInput>,
        outputs: &'a [IoDescription],
        workdir: &'a Path,
        progress: &'a ProgressSender,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<Map<String, Value>>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(EngineError::execution("job dismissed"));
            }
            let kind = loaded.package.application_kind()?;
            info!(kind = kind_name(&kind), "Dispatching package");
            match kind {
                ApplicationKind::Command { image } => {
                    docker::run_tool(
                        &loaded.package,
                        image.as_deref(),
                        &inputs,
                        outputs,
                        workdir,
                        &self.config,
                        progress,
                    )
                    .await
                }
                ApplicationKind::Builtin { process } => {
                    let mut backend_inputs = Map::new();
                    for input in &inputs {
                        backend_inputs.insert(input.io.id.clone(), input.backend_value());
                    }
                    builtin::run_builtin(&process, &backend_inputs).await
                }
                ApplicationKind::Wps1 { provider, process } => {
                    let output_ids: Vec<String> =
                        outputs.iter().map(|io| io.id.clone()).collect();
                    wps1::run_remote(
                        &provider,
                        &process,
                        &inputs,
                        &output_ids,
                        &self.config,
                        progress,
                        cancel,
                    )
                    .await
                }
                ApplicationKind::Esgf {
                    provider,
                    process,
                    api_key,
                } => {
                    esgf::run_remote(
                        &provider,
                        &process,
                        api_key.as_deref(),
                        &inputs,
                        &self.config,
                        progress,
                        cancel,
                    )
                    .await
                }
                ApplicationKind::Workflow => {
                    workflow::run_workflow(self, loaded, &inputs, workdir, progress, cancel).await
                }
            }
        })
    }
}

fn io_list(description: &Value, section: &str) -> Result<Vec<IoDescription>> {
    description
        .get(section)
        .and_then(Value::as_array)
        .map(|list| list.iter().map(tellus_core::io_from_json).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn kind_name(kind: &ApplicationKind) -> &'static str {
    match kind {
        ApplicationKind::Command { image: Some(_) } => "docker",
        ApplicationKind::Command { image: None } => "command",
        ApplicationKind::Wps1 { .. } => "wps1-remote",
        ApplicationKind::Esgf { .. } => "esgf-remote",
        ApplicationKind::Builtin { .. } => "builtin",
        ApplicationKind::Workflow => "workflow",
    }
}
