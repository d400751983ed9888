//! Deploy execution

pub mod events;
pub mod executor;
pub mod fetch_revision;
pub mod scheduler;
pub mod workspace;

pub use events::{EventHandler, ExecutionEvent};
pub use executor::{DeployExecutor, ExecuteError, Execution};
pub use fetch_revision::{parse_revision, RevisionFetcher};
pub use scheduler::{ChannelScheduler, FollowUpJob, Scheduler};
pub use workspace::{Workspace, WorkspaceFactory};
