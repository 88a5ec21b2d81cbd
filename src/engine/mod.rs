//! Pure computation engine(s) for deterministic aggregate logic.

pub mod cooldown;
pub mod income;
pub mod projection;
pub mod score;

pub use cooldown::{set_cooldowns, steal_cooldowns, SetCooldown, StealCooldown};
pub use income::{compute_daily_income, IncomeBreakdown};
pub use projection::{ProjectionSnapshot, ProjectionState};
pub use score::{apply_scores, compute_scores, Scores};
