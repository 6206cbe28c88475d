pub mod identity;
pub mod inventory;
pub mod lifecycle;
pub mod teardown;

pub use identity::StackIdentity;
pub use inventory::{DeployedStack, InventoryError, list_deployments};
pub use lifecycle::{LifecycleError, Observation, RunMode, StackLifecycle, Workflow};
pub use teardown::{Confirm, TeardownError, TeardownOptions, TeardownOutcome, TerminalConfirm, teardown};
