use chrono::{NaiveTime, Timelike, Utc};

/// Current UTC time of day.
pub fn utc_now() -> NaiveTime {
    Utc::now().time()
}

/// NMEA `HHMMSS` time field.
pub fn time2nmea(t: NaiveTime) -> String {
    format!("{:02}{:02}{:02}", t.hour(), t.minute(), t.second())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time2nmea() {
        let t = NaiveTime::from_hms_opt(7, 5, 9).unwrap();
        assert_eq!(time2nmea(t), "070509");
        let t = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap();
        assert_eq!(time2nmea(t), "235959");
    }
}
