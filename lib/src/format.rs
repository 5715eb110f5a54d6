use crate::calendar::CalendarMoment;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// e.g. "Sun, 31st December"
pub fn format_date(moment: &CalendarMoment) -> String {
    let weekday = WEEKDAYS[moment.weekday() as usize % WEEKDAYS.len()];
    let month = MONTHS[(moment.month() as usize + MONTHS.len() - 1) % MONTHS.len()];
    format!(
        "{weekday}, {}{} {month}",
        moment.day(),
        ordinal_suffix(moment.day())
    )
}

/// e.g. "09:05"
pub fn format_time(moment: &CalendarMoment) -> String {
    format!("{:02}:{:02}", moment.hour(), moment.minute())
}

pub fn format_moment(moment: &CalendarMoment) -> (String, String) {
    (format_date(moment), format_time(moment))
}
