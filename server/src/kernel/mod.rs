// Kernel - core infrastructure shared by the scheduler engine and its
// control plane.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not recurrence/expansion
// logic. That lives in `domains::scheduler`.

pub mod retry;
pub mod schema;
pub mod server_kernel;

pub use retry::{with_retry, RetryConfig};
pub use server_kernel::ServerKernel;
