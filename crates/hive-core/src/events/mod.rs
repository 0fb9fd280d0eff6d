//! Campus events calendar

pub mod ics;

pub use ics::{CalendarEvent, IcsCalendar};
