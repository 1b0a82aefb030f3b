pub mod outcome;
pub mod playlist;
pub mod query;

pub use outcome::{DegradeReason, Outcome};
pub use playlist::*;
pub use query::{QueryRequest, QueryResponse, WorkerRequest, WorkerResponse};
