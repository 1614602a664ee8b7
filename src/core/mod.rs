//! Service wiring: HTTP server, worker runtime and cron scheduler

pub mod bootstrap;
pub mod http;
pub mod runtime;
pub mod scheduler;

pub use bootstrap::{ServiceOptions, Services};
pub use http::{create_router, start_server, AppState};
pub use runtime::PromotionRuntime;
pub use scheduler::JobScheduler;
