//! Membership lifecycle and invite-link bookkeeping for a managed group chat.
//!
//! ```text
//! platform events ──> Service ──> InviteRegistry ─────> JsonFile
//!                        │    └─> MembershipRegistry ─> JsonFile
//!                        │    └─> RevocationWorkflow
//!                        └──> sweep ──> ChatPlatform (ban/unban)
//! ```
//!
//! Everything that touches registry state goes through [`Service`], which
//! holds a single lock so the daily sweep never interleaves with command
//! handling.

pub mod error;
pub mod invites;
pub mod members;
pub mod mock;
pub mod platform;
pub mod revocation;
pub mod service;
pub mod sweep;

pub use error::{CommandError, PlatformError, RegistryError};
pub use invites::{InviteRegistry, RevokeAllReport};
pub use members::{JoinOutcome, MembershipRegistry};
pub use platform::{ChatPlatform, PlatformMember};
pub use revocation::{PendingAction, Resolution, RevocationWorkflow};
pub use service::{RevokeAllReply, RevokeReply, SeedReport, Service, Settings, WorkflowOutcome};
pub use sweep::{SweepFailure, SweepReport};
