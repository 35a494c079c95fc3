// In-memory store implementations for dev mode and tests
// Decision: parking_lot for thread-safe access; records cloned on the way
// in and out so callers never observe partial updates

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tellus_core::{
    Bill, EngineError, Job, JobStatus, Process, Quote, Result, Service, Visibility,
};
use uuid::Uuid;

use crate::stores::{BillStore, JobFilter, JobStore, ProcessStore, QuoteStore, ServiceStore};

/// In-memory process registry
#[derive(Default)]
pub struct InMemoryProcesses {
    processes: RwLock<HashMap<String, Process>>,
}

#[async_trait]
impl ProcessStore for InMemoryProcesses {
    async fn save_process(&self, process: Process, overwrite: bool) -> Result<()> {
        let mut processes = self.processes.write();
        if !overwrite && processes.contains_key(&process.id) {
            return Err(EngineError::ProcessRegistration(format!(
                "process '{}' already registered",
                process.id
            )));
        }
        processes.insert(process.id.clone(), process);
        Ok(())
    }

    async fn fetch_by_id(&self, process_id: &str) -> Result<Option<Process>> {
        Ok(self.processes.read().get(process_id).cloned())
    }

    async fn list_processes(&self, visibility: Option<Visibility>) -> Result<Vec<Process>> {
        let processes = self.processes.read();
        let mut result: Vec<Process> = processes
            .values()
            .filter(|p| visibility.map(|v| p.visibility == v).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn delete_process(&self, process_id: &str) -> Result<bool> {
        Ok(self.processes.write().remove(process_id).is_some())
    }

    async fn get_visibility(&self, process_id: &str) -> Result<Option<Visibility>> {
        Ok(self
            .processes
            .read()
            .get(process_id)
            .map(|p| p.visibility))
    }

    async fn set_visibility(&self, process_id: &str, visibility: Visibility) -> Result<bool> {
        let mut processes = self.processes.write();
        match processes.get_mut(process_id) {
            Some(process) => {
                process.visibility = visibility;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory job store
#[derive(Default)]
pub struct InMemoryJobs {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

#[async_trait]
impl JobStore for InMemoryJobs {
    async fn save_job(&self, job: Job) -> Result<()> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }

    async fn update_job(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        let Some(existing) = jobs.get(&job.id) else {
            return Err(EngineError::JobNotFound(job.id));
        };
        // a dismissed record is final: late worker updates are dropped
        if existing.status == JobStatus::Dismissed {
            return Ok(());
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn fetch_by_id(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().get(&job_id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.read();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| {
                filter
                    .process
                    .as_deref()
                    .map(|p| j.process == p)
                    .unwrap_or(true)
                    && filter
                        .service
                        .as_deref()
                        .map(|s| j.service.as_deref() == Some(s))
                        .unwrap_or(true)
                    && filter.status.map(|s| j.status == s).unwrap_or(true)
                    && filter.access.map(|a| j.access == a).unwrap_or(true)
                    && filter.tags.iter().all(|t| j.tags.contains(t))
            })
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created.cmp(&a.created));
        let limit = filter.limit.unwrap_or(result.len().max(1));
        Ok(result
            .into_iter()
            .skip(filter.page * limit)
            .take(limit)
            .collect())
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<bool> {
        Ok(self.jobs.write().remove(&job_id).is_some())
    }
}

/// In-memory provider registry
#[derive(Default)]
pub struct InMemoryServices {
    services: RwLock<HashMap<String, Service>>,
}

#[async_trait]
impl ServiceStore for InMemoryServices {
    async fn save_service(&self, service: Service, overwrite: bool) -> Result<()> {
        let mut services = self.services.write();
        if !overwrite && services.contains_key(&service.name) {
            return Err(EngineError::ProcessRegistration(format!(
                "service '{}' already registered",
                service.name
            )));
        }
        services.insert(service.name.clone(), service);
        Ok(())
    }

    async fn fetch_by_name(&self, name: &str) -> Result<Option<Service>> {
        Ok(self.services.read().get(name).cloned())
    }

    async fn fetch_by_url(&self, url: &str) -> Result<Option<Service>> {
        Ok(self
            .services
            .read()
            .values()
            .find(|s| s.url == url)
            .cloned())
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let services = self.services.read();
        let mut result: Vec<Service> = services.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn delete_service(&self, name: &str) -> Result<bool> {
        Ok(self.services.write().remove(name).is_some())
    }
}

/// In-memory quote store
#[derive(Default)]
pub struct InMemoryQuotes {
    quotes: RwLock<HashMap<Uuid, Quote>>,
}

#[async_trait]
impl QuoteStore for InMemoryQuotes {
    async fn save_quote(&self, quote: Quote) -> Result<()> {
        self.quotes.write().insert(quote.id, quote);
        Ok(())
    }

    async fn fetch_by_id(&self, quote_id: Uuid) -> Result<Option<Quote>> {
        Ok(self.quotes.read().get(&quote_id).cloned())
    }

    async fn list_quotes(&self, process: Option<&str>) -> Result<Vec<Quote>> {
        let quotes = self.quotes.read();
        let mut result: Vec<Quote> = quotes
            .values()
            .filter(|q| process.map(|p| q.process == p).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(result)
    }
}

/// In-memory bill store
#[derive(Default)]
pub struct InMemoryBills {
    bills: RwLock<HashMap<Uuid, Bill>>,
}

#[async_trait]
impl BillStore for InMemoryBills {
    async fn save_bill(&self, bill: Bill) -> Result<()> {
        self.bills.write().insert(bill.id, bill);
        Ok(())
    }

    async fn fetch_by_id(&self, bill_id: Uuid) -> Result<Option<Bill>> {
        Ok(self.bills.read().get(&bill_id).cloned())
    }

    async fn list_bills(&self, quote: Option<Uuid>) -> Result<Vec<Bill>> {
        let bills = self.bills.read();
        let mut result: Vec<Bill> = bills
            .values()
            .filter(|b| quote.map(|q| b.quote == q).unwrap_or(true))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tellus_core::ProcessType;

    fn process(id: &str, visibility: Visibility) -> Process {
        let mut p = Process::new(id, ProcessType::Application).unwrap();
        p.visibility = visibility;
        p
    }

    #[tokio::test]
    async fn test_save_without_overwrite_rejects_duplicates() {
        let store = InMemoryProcesses::default();
        store
            .save_process(process("proc-a", Visibility::Public), false)
            .await
            .unwrap();
        let err = store
            .save_process(process("proc-a", Visibility::Public), false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ProcessRegistration(_)));
        // overwrite allowed explicitly
        store
            .save_process(process("proc-a", Visibility::Private), true)
            .await
            .unwrap();
        assert_eq!(
            store.get_visibility("proc-a").await.unwrap(),
            Some(Visibility::Private)
        );
    }

    #[tokio::test]
    async fn test_round_trip_preserves_io() {
        use tellus_core::{IoDescription, LiteralType};
        let p = process("proc-io", Visibility::Public)
            .with_io(
                vec![IoDescription::literal("msg", LiteralType::String)],
                vec![],
            )
            .unwrap();
        let store = InMemoryProcesses::default();
        store.save_process(p.clone(), false).await.unwrap();
        let loaded = store.fetch_by_id("proc-io").await.unwrap().unwrap();
        assert_eq!(loaded.inputs, p.inputs);
        // idempotent: save/load again yields the same description
        store.save_process(loaded.clone(), true).await.unwrap();
        let reloaded = store.fetch_by_id("proc-io").await.unwrap().unwrap();
        assert_eq!(reloaded.inputs, p.inputs);
    }

    #[tokio::test]
    async fn test_list_filters_visibility() {
        let store = InMemoryProcesses::default();
        store
            .save_process(process("proc-pub", Visibility::Public), false)
            .await
            .unwrap();
        store
            .save_process(process("proc-priv", Visibility::Private), false)
            .await
            .unwrap();
        let public = store
            .list_processes(Some(Visibility::Public))
            .await
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, "proc-pub");
        assert_eq!(store.list_processes(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_job_filtering_and_updates() {
        let store = InMemoryJobs::default();
        let mut job = Job::new("proc-a", json!({}));
        store.save_job(job.clone()).await.unwrap();

        job.apply_update(JobStatus::Running, 20, "working");
        store.update_job(job.clone()).await.unwrap();
        let loaded = store.fetch_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);

        let running = store
            .list_jobs(&JobFilter {
                process: Some("proc-a".into()),
                status: Some(JobStatus::Running),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(running.len(), 1);

        let none = store
            .list_jobs(&JobFilter {
                process: Some("other".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_records_are_final() {
        let store = InMemoryJobs::default();
        let mut job = Job::new("proc-a", json!({}));
        store.save_job(job.clone()).await.unwrap();

        let mut dismissed = job.clone();
        dismissed.apply_update(JobStatus::Dismissed, 0, "Job dismissed");
        store.update_job(dismissed).await.unwrap();

        // a late worker update must not resurrect the job
        job.apply_update(JobStatus::Running, 50, "still working");
        store.update_job(job.clone()).await.unwrap();
        let stored = store.fetch_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Dismissed);
    }

    #[tokio::test]
    async fn test_update_unknown_job_fails() {
        let store = InMemoryJobs::default();
        let job = Job::new("proc-a", json!({}));
        assert!(matches!(
            store.update_job(job).await.unwrap_err(),
            EngineError::JobNotFound(_)
        ));
    }
}
