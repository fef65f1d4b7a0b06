pub mod claimer;
pub mod finalizer;
pub mod maintenance;
pub mod memory;
pub mod model;
pub mod reconciler;
pub mod repo;
pub mod retry;
pub mod store;

pub use claimer::TaskClaimer;
pub use finalizer::{aggregate_status, FinalizeSummary, Finalizer};
pub use maintenance::{Maintenance, RequeueSummary};
pub use memory::MemoryJobStore;
pub use model::{Job, JobStatus, NewJob, Platform, Task, TaskStatus};
pub use reconciler::{PassReport, PassStats, Reconciler, ReconcilerConfig};
pub use repo::JobsRepo;
pub use store::JobStore;
