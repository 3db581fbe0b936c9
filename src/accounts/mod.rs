pub mod manager;
mod oauth_ops;
mod pool;
mod refresher;
mod resource;
mod variant;

pub use manager::{AccountManagerArgs, AccountManagerHandle, RefreshFailure, spawn};
pub use pool::{PoolEntry, RotationPool, RotationStrategy};
pub use resource::{Account, AccountLease, AccountPatch, AccountSummary};
pub use variant::{ANTIGRAVITY, GEMINICLI, UpstreamVariant, VariantKind};
