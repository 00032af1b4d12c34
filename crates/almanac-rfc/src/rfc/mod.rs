pub mod caldav;
pub mod ical;
pub mod validation;
