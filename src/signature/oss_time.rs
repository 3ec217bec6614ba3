use std::convert::From;
use std::fmt::{Display, Formatter, Result};
use time::OffsetDateTime;

#[derive(Debug, Copy, Clone)]
pub enum Month {
    January = 1,
    February = 2,
    March = 3,
    April = 4,
    May = 5,
    June = 6,
    July = 7,
    August = 8,
    September = 9,
    October = 10,
    November = 11,
    December = 12,
}

impl Display for Month {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(match self {
            Month::January => "Jan",
            Month::February => "Feb",
            Month::March => "Mar",
            Month::April => "Apr",
            Month::May => "May",
            Month::June => "Jun",
            Month::July => "Jul",
            Month::August => "Aug",
            Month::September => "Sep",
            Month::October => "Oct",
            Month::November => "Nov",
            Month::December => "Dec",
        })
    }
}

impl From<u8> for Month {
    fn from(item: u8) -> Self {
        match item {
            1 => Month::January,
            2 => Month::February,
            3 => Month::March,
            4 => Month::April,
            5 => Month::May,
            6 => Month::June,
            7 => Month::July,
            8 => Month::August,
            9 => Month::September,
            10 => Month::October,
            11 => Month::November,
            12 => Month::December,
            _ => Month::January,
        }
    }
}

/// Formats a date the way the `Date` header and the string-to-sign expect it,
/// e.g. `Wed, 28 Nov 2018 09:26:08 GMT`.
pub(crate) fn rfc1123(date: &OffsetDateTime) -> String {
    let weekday = date.weekday().to_string();
    let month = Month::from(date.month());

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        &weekday[0..3],
        date.day(),
        month,
        date.year(),
        date.hour(),
        date.minute(),
        date.second()
    )
}

#[cfg(test)]
mod tests {
    use super::rfc1123;
    use time::OffsetDateTime;

    #[test]
    fn formats_rfc1123_gmt() {
        let date = OffsetDateTime::from_unix_timestamp(1_543_397_168);
        assert_eq!(rfc1123(&date), "Wed, 28 Nov 2018 09:26:08 GMT");
    }

    #[test]
    fn pads_single_digit_fields() {
        // Sat, 02 Mar 2019 04:05:06 GMT
        let date = OffsetDateTime::from_unix_timestamp(1_551_499_506);
        assert_eq!(rfc1123(&date), "Sat, 02 Mar 2019 04:05:06 GMT");
    }
}
