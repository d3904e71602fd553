use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Current time at the microsecond precision PostgreSQL `TIMESTAMPTZ` keeps
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
