mod acquire;
mod audit;
mod serve;

pub use acquire::run_acquire;
pub use audit::run_audit;
pub use serve::run_serve;
