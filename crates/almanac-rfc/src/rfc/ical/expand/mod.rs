//! Time zone resolution and civil-time rule evaluation.
//!
//! Recurrence rules are evaluated on wall-clock readings and anchored to
//! absolute instants afterwards, so `BYDAY`/`BYMONTHDAY` land on the
//! intended local date across daylight-saving transitions.

mod civil;
mod timezone;
mod vtimezone;

pub use civil::{CivilRule, civil_instants};
pub use timezone::{TimezoneError, Zone, ZoneResolver, normalize_tzid};
pub use vtimezone::{Observance, ObservanceKind, VTimezone};
