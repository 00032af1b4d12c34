#![allow(dead_code)]

use almanac_service::storage::MemoryStore;
use chrono::{DateTime, TimeZone as _, Utc};

pub const CALENDAR: &str = "cal";

pub const TODO: &str = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";

pub const EVENT_20120101: &str =
    "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART:20120101\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

pub const EVENT_20120103: &str =
    "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART:20120103\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

pub const BERLIN_WEEKLY: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:foobar\r\n\
DTEND;TZID=Europe/Berlin:20120207T191500\r\n\
RRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=TU,TH\r\n\
SUMMARY:RecurringEvents on tuesday and thursday\r\n\
DTSTART;TZID=Europe/Berlin:20120207T181500\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

pub const COUNT_WITH_EXDATES: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:all-excluded\r\n\
DTSTART:20120101T100000Z\r\n\
DTEND:20120101T110000Z\r\n\
RRULE:FREQ=DAILY;COUNT=3\r\n\
EXDATE:20120101T100000Z,20120102T100000Z\r\n\
EXDATE:20120103T100000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

pub const SINGLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Almanac//Fixtures//EN\r\n\
BEGIN:VEVENT\r\n\
UID:single\r\n\
SUMMARY:Dentist\r\n\
DTSTART:20120105T083000Z\r\n\
DTEND:20120105T093000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

pub const CORRUPT: &str = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART:nonsense\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

/// The to-do plus two all-day events, in insertion order.
pub fn three_objects() -> MemoryStore {
    MemoryStore::new()
        .with_object(CALENDAR, "todo", TODO)
        .with_object(CALENDAR, "event", EVENT_20120101)
        .with_object(CALENDAR, "event2", EVENT_20120103)
}
