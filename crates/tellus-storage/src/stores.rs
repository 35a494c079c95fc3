// Store traits consumed by the engine
//
// Decision: trait objects over enum dispatch; only the in-memory backend
// ships with the engine, the document-store backend lives with the
// deployment.

use async_trait::async_trait;
use tellus_core::{Bill, Job, JobStatus, Process, Quote, Result, Service, Visibility};
use uuid::Uuid;

/// Process registry contract
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Save a process; with `overwrite` false a duplicate id is a
    /// ProcessRegistration error.
    async fn save_process(&self, process: Process, overwrite: bool) -> Result<()>;

    async fn fetch_by_id(&self, process_id: &str) -> Result<Option<Process>>;

    /// List processes, optionally restricted to one visibility
    async fn list_processes(&self, visibility: Option<Visibility>) -> Result<Vec<Process>>;

    /// Delete a process, returning whether it existed
    async fn delete_process(&self, process_id: &str) -> Result<bool>;

    async fn get_visibility(&self, process_id: &str) -> Result<Option<Visibility>>;

    /// Set visibility, returning whether the process existed
    async fn set_visibility(&self, process_id: &str, visibility: Visibility) -> Result<bool>;
}

/// Filters for job listings
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub process: Option<String>,
    pub service: Option<String>,
    pub status: Option<JobStatus>,
    pub tags: Vec<String>,
    pub access: Option<Visibility>,
    pub page: usize,
    pub limit: Option<usize>,
}

/// Job records
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn save_job(&self, job: Job) -> Result<()>;

    /// Replace the stored record; JobNotFound when absent
    async fn update_job(&self, job: Job) -> Result<()>;

    async fn fetch_by_id(&self, job_id: Uuid) -> Result<Option<Job>>;

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    async fn delete_job(&self, job_id: Uuid) -> Result<bool>;
}

/// Registered remote providers
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn save_service(&self, service: Service, overwrite: bool) -> Result<()>;

    async fn fetch_by_name(&self, name: &str) -> Result<Option<Service>>;

    async fn fetch_by_url(&self, url: &str) -> Result<Option<Service>>;

    async fn list_services(&self) -> Result<Vec<Service>>;

    async fn delete_service(&self, name: &str) -> Result<bool>;
}

/// Price quotes
#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn save_quote(&self, quote: Quote) -> Result<()>;

    async fn fetch_by_id(&self, quote_id: Uuid) -> Result<Option<Quote>>;

    async fn list_quotes(&self, process: Option<&str>) -> Result<Vec<Quote>>;
}

/// Bills issued for completed jobs
#[async_trait]
pub trait BillStore: Send + Sync {
    async fn save_bill(&self, bill: Bill) -> Result<()>;

    async fn fetch_by_id(&self, bill_id: Uuid) -> Result<Option<Bill>>;

    async fn list_bills(&self, quote: Option<Uuid>) -> Result<Vec<Bill>>;
}
