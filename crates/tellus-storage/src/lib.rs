// Repository layer
//
// Four abstract repositories (services, processes, jobs, quotes/bills) own
// all shared mutable state. Production deployments back them with a
// document store; the in-memory implementation here serves dev mode and
// tests. All writes go through save/update methods, which are the natural
// serialization points.

pub mod memory;
pub mod stores;

pub use memory::{InMemoryBills, InMemoryJobs, InMemoryProcesses, InMemoryQuotes, InMemoryServices};
pub use stores::{BillStore, JobFilter, JobStore, ProcessStore, QuoteStore, ServiceStore};

use std::sync::Arc;

/// Bundle of the repositories an engine instance works against
#[derive(Clone)]
pub struct Repositories {
    pub processes: Arc<dyn ProcessStore>,
    pub jobs: Arc<dyn JobStore>,
    pub services: Arc<dyn ServiceStore>,
    pub quotes: Arc<dyn QuoteStore>,
    pub bills: Arc<dyn BillStore>,
}

impl Repositories {
    /// In-memory repositories (dev mode; all data lost on restart)
    pub fn in_memory() -> Self {
        Self {
            processes: Arc::new(InMemoryProcesses::default()),
            jobs: Arc::new(InMemoryJobs::default()),
            services: Arc::new(InMemoryServices::default()),
            quotes: Arc::new(InMemoryQuotes::default()),
            bills: Arc::new(InMemoryBills::default()),
        }
    }
}
