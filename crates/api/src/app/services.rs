//! Infrastructure wiring for the API process.

use std::sync::Arc;

use tracing::{info, warn};

use conductor_infra::{
    register_analysis_handlers, AgentRegistry, AssignmentService, CascadeTrigger,
    EchoAnalysisBackend, InMemoryAgentRegistry, InMemoryJobStore, InMemoryTaskStore, JobRunner,
    JobStore, PostgresJobStore, PostgresTaskStore, TaskStore,
};

/// Shared service graph injected into every handler.
///
/// Stores are type-erased so the same wiring serves the in-memory dev setup
/// and the Postgres deployment; everything downstream coordinates purely
/// through the store traits.
pub struct AppServices {
    pub assignment: AssignmentService<Arc<dyn TaskStore>>,
    pub runner: JobRunner<Arc<dyn JobStore>>,
    pub jobs: Arc<dyn JobStore>,
    pub agents: Arc<dyn AgentRegistry>,
}

/// Build the service graph.
///
/// With `DATABASE_URL` set, tasks and jobs persist to Postgres (pool is
/// created lazily, so startup does not require the database to be up);
/// otherwise everything lives in process memory, which is enough for dev and
/// for the black-box tests.
pub fn build_services() -> AppServices {
    let (task_store, job_store): (Arc<dyn TaskStore>, Arc<dyn JobStore>) =
        match std::env::var("DATABASE_URL") {
            Ok(url) => match sqlx::PgPool::connect_lazy(&url) {
                Ok(pool) => {
                    info!("using postgres-backed stores");
                    (
                        Arc::new(PostgresTaskStore::new(pool.clone())),
                        Arc::new(PostgresJobStore::new(pool)),
                    )
                }
                Err(e) => {
                    warn!(error = %e, "DATABASE_URL invalid, falling back to in-memory stores");
                    in_memory_stores()
                }
            },
            Err(_) => {
                info!("DATABASE_URL not set, using in-memory stores");
                in_memory_stores()
            }
        };

    let cascade = Arc::new(CascadeTrigger::new(
        Arc::clone(&task_store),
        Arc::clone(&job_store),
    ));
    let assignment = AssignmentService::new(Arc::clone(&task_store)).with_observer(cascade);

    let mut runner = JobRunner::new(Arc::clone(&job_store));
    register_analysis_handlers(&mut runner, Arc::new(EchoAnalysisBackend));

    AppServices {
        assignment,
        runner,
        jobs: job_store,
        agents: Arc::new(InMemoryAgentRegistry::new()),
    }
}

fn in_memory_stores() -> (Arc<dyn TaskStore>, Arc<dyn JobStore>) {
    (
        Arc::new(InMemoryTaskStore::new()),
        Arc::new(InMemoryJobStore::new()),
    )
}
