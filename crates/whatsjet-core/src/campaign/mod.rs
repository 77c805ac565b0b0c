//! Campaign State Machine

mod manager;
mod schedule;
mod transitions;

pub use manager::CampaignManager;
pub use schedule::{next_occurrence, next_run_at, normalize_cron_expr, parse_pattern};
pub use transitions::{allowed_targets, check_transition, is_allowed};
