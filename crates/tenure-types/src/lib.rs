pub mod ids;
pub mod models;
pub mod timestamp;

pub use ids::{ChatId, InviteToken, UserId};
pub use models::{InviteLink, JoinedAt, LinkState, MemberRecord};
