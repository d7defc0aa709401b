// libs/appointment-cell/src/services/slots.rs
use chrono::{NaiveDate, NaiveTime};

use crate::models::slot_time_format;

const FIRST_SLOT_HOUR: u32 = 9;
const LAST_SLOT_HOUR: u32 = 16;
const SLOT_MINUTES: [u32; 2] = [0, 30];

/// Bookable start times, 09:00 through 16:30 on the half hour.
pub fn slot_times() -> Vec<NaiveTime> {
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .flat_map(|hour| {
            SLOT_MINUTES
                .iter()
                .filter_map(move |minute| NaiveTime::from_hms_opt(hour, *minute, 0))
        })
        .collect()
}

pub fn is_bookable_time(time: NaiveTime) -> bool {
    slot_times().contains(&time)
}

pub fn format_slot_time(time: NaiveTime) -> String {
    time.format(slot_time_format::FORMAT).to_string()
}

pub fn slot_key(doctor_id: &str, date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "slots/{}/{}/{}",
        doctor_id,
        date.format("%Y-%m-%d"),
        format_slot_time(time)
    )
}
