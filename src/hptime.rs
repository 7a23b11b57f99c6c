use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

use crate::byte_order::ByteOrder;
use crate::mseed_error::MSeedError;

/// Ticks per second of the high precision time scale.
pub const HPTMODULUS: i64 = 1_000_000;

lazy_static! {
    /// SEED time string "YYYY[,DDD,HH:MM:SS.FFFFFF]"; the delimiter may be a
    /// comma, colon or period, the fractional seconds must follow a period.
    static ref PARSE_SEED_TIME: Regex = Regex::new(
        r"(?x)^
            (?P<year>\d{4})
            (?:[,:.](?P<day>\d{1,3})
            (?:[,:.](?P<hour>\d{1,2})
            (?:[,:.](?P<min>\d{1,2})
            (?:[,:.](?P<sec>\d{1,2})
            (?:\.(?P<frac>\d{1,6}))?)?)?)?)?
            $"
    )
    .unwrap();

    /// Generic time string "YYYY[/MM/DD HH:MM:SS.FFFFFF]" with dash, slash,
    /// colon or period delimiters and 'T' or space between date and time.
    static ref PARSE_TIME: Regex = Regex::new(
        r"(?x)^
            (?P<year>\d{4})
            (?:[-/:.](?P<mon>\d{1,2})
            (?:[-/:.](?P<mday>\d{1,2})
            (?:[-/:.T\ ](?P<hour>\d{1,2})
            (?:[-/:.](?P<min>\d{1,2})
            (?:[-\ /:.](?P<sec>\d{1,2})
            (?:\.(?P<frac>\d{1,6}))?)?)?)?)?)?
            $"
    )
    .unwrap();
}

/// SEED binary time, a 10-byte calendar label with 1/10000 second resolution.
/// No leap second rules are applied, the second field simply allows 60.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTime {
    pub year: u16,
    /// Day of year, 1-366.
    pub day: u16,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub unused: u8,
    /// Fractional seconds in units of 1/10000 second.
    pub fract: u16,
}

impl BTime {
    /// Wire size in bytes.
    pub const LEN: usize = 10;

    /// Parse a binary BTime at the start of `buf`.
    pub fn parse(buf: &[u8], order: ByteOrder) -> BTime {
        BTime {
            year: order.read_u16(&buf[0..2]),
            day: order.read_u16(&buf[2..4]),
            hour: buf[4],
            min: buf[5],
            sec: buf[6],
            unused: buf[7],
            fract: order.read_u16(&buf[8..10]),
        }
    }

    /// Write the 10 binary bytes at the start of `buf`.
    pub fn write(&self, buf: &mut [u8], order: ByteOrder) {
        order.write_u16(&mut buf[0..2], self.year);
        order.write_u16(&mut buf[2..4], self.day);
        buf[4] = self.hour;
        buf[5] = self.min;
        buf[6] = self.sec;
        buf[7] = self.unused;
        order.write_u16(&mut buf[8..10], self.fract);
    }

    /// Convert to a high precision epoch time, validating each field range.
    pub fn to_hptime(&self) -> Result<HpTime, MSeedError> {
        check_range("year", self.year as i64, 1900, 3000)?;
        check_range("day-of-year", self.day as i64, 1, 366)?;
        check_range("hour", self.hour as i64, 0, 23)?;
        check_range("minute", self.min as i64, 0, 59)?;
        check_range("second", self.sec as i64, 0, 60)?;
        check_range("fractional seconds", self.fract as i64, 0, 9999)?;
        let date = NaiveDate::from_yo_opt(self.year as i32, self.day as u32).ok_or_else(|| {
            MSeedError::OutOfRange(format!("day {} invalid for year {}", self.day, self.year))
        })?;
        let days = date
            .signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .num_days();
        let secs = 60 * (60 * (24 * days + self.hour as i64) + self.min as i64) + self.sec as i64;
        Ok(HpTime::from_ticks(
            secs * HPTMODULUS + self.fract as i64 * (HPTMODULUS / 10_000),
        ))
    }

    /// SEED time string at BTime resolution, e.g. "2001,195,12:38:00.0000".
    pub fn seed_string(&self) -> String {
        format!(
            "{:04},{:03},{:02}:{:02}:{:02}.{:04}",
            self.year, self.day, self.hour, self.min, self.sec, self.fract
        )
    }

    /// ISO time string at BTime resolution, e.g. "2001-07-14T12:38:00.0000".
    pub fn iso_string(&self) -> Result<String, MSeedError> {
        let (month, mday) = doy_to_md(self.year as i32, self.day as u32)?;
        Ok(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:04}",
            self.year, month, mday, self.hour, self.min, self.sec, self.fract
        ))
    }
}

impl fmt::Display for BTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.seed_string())
    }
}

/// High precision epoch time, a signed count of 1/HPTMODULUS second ticks
/// since 1970-01-01T00:00:00 UTC.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HpTime {
    ticks: i64,
}

impl HpTime {
    pub fn from_ticks(ticks: i64) -> HpTime {
        HpTime { ticks }
    }

    pub fn ticks(self) -> i64 {
        self.ticks
    }

    /// Whole seconds since the epoch, rounded toward negative infinity.
    pub fn epoch_seconds(self) -> i64 {
        self.ticks.div_euclid(HPTMODULUS)
    }

    /// Sub-second portion as a non-negative tick count.
    pub fn subsecond_ticks(self) -> i64 {
        self.ticks.rem_euclid(HPTMODULUS)
    }

    /// Seconds since the epoch as a double, losing precision beyond ~2^53.
    pub fn as_seconds(self) -> f64 {
        self.ticks as f64 / HPTMODULUS as f64
    }

    /// Build from individual time values with range validation.
    pub fn from_time(
        year: i32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
        usec: u32,
    ) -> Result<HpTime, MSeedError> {
        check_range("microsecond", usec as i64, 0, 999_999)?;
        let btime = BTime {
            year: year as u16,
            day: day as u16,
            hour: hour as u8,
            min: min as u8,
            sec: sec as u8,
            unused: 0,
            fract: 0,
        };
        Ok(btime.to_hptime()? + usec as i64 * (HPTMODULUS / 1_000_000))
    }

    /// Convert to a BTime label. The microseconds beyond the 1/10000 second
    /// resolution are truncated, not rounded.
    pub fn to_btime(self) -> Result<BTime, MSeedError> {
        let secs = self.epoch_seconds();
        let fract = (self.subsecond_ticks() / (HPTMODULUS / 10_000)) as u16;
        let dt = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| MSeedError::OutOfRange(format!("epoch seconds {}", secs)))?;
        Ok(BTime {
            year: dt.year() as u16,
            day: dt.ordinal() as u16,
            hour: dt.hour() as u8,
            min: dt.minute() as u8,
            sec: dt.second() as u8,
            unused: 0,
            fract,
        })
    }

    /// SEED time string with microseconds, e.g. "2001,195,12:38:00.000000".
    pub fn seed_string(self) -> Result<String, MSeedError> {
        let b = self.to_btime()?;
        Ok(format!(
            "{:04},{:03},{:02}:{:02}:{:02}.{:06}",
            b.year,
            b.day,
            b.hour,
            b.min,
            b.sec,
            self.subsecond_ticks()
        ))
    }

    /// ISO time string with microseconds, e.g. "2001-07-14T12:38:00.000000".
    pub fn iso_string(self) -> Result<String, MSeedError> {
        let b = self.to_btime()?;
        let (month, mday) = doy_to_md(b.year as i32, b.day as u32)?;
        Ok(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}",
            b.year,
            month,
            mday,
            b.hour,
            b.min,
            b.sec,
            self.subsecond_ticks()
        ))
    }

    /// Parse a SEED time string "YYYY[,DDD,HH:MM:SS.FFFFFF]". Omitted values
    /// are zero except the day-of-year which defaults to 1.
    pub fn parse_seed(timestr: &str) -> Result<HpTime, MSeedError> {
        let caps = PARSE_SEED_TIME
            .captures(timestr.trim())
            .ok_or_else(|| MSeedError::TimeParse(timestr.to_string()))?;
        let year: i32 = caps["year"].parse().unwrap();
        check_range("year", year as i64, 1900, 3000)?;
        let day: u32 = capture_or(&caps, "day", 1);
        check_range("day-of-year", day as i64, 1, 366)?;
        let hour: u32 = capture_or(&caps, "hour", 0);
        check_range("hour", hour as i64, 0, 23)?;
        let min: u32 = capture_or(&caps, "min", 0);
        check_range("minute", min as i64, 0, 59)?;
        let sec: u32 = capture_or(&caps, "sec", 0);
        check_range("second", sec as i64, 0, 60)?;
        let usec = fraction_usec(caps.name("frac").map(|m| m.as_str()));
        HpTime::from_time(year, day, hour, min, sec, usec)
    }

    /// Parse a generic time string "YYYY[/MM/DD HH:MM:SS.FFFFFF]". Omitted
    /// values are zero except month and day-of-month which default to 1.
    pub fn parse_timestr(timestr: &str) -> Result<HpTime, MSeedError> {
        let caps = PARSE_TIME
            .captures(timestr.trim())
            .ok_or_else(|| MSeedError::TimeParse(timestr.to_string()))?;
        let year: i32 = caps["year"].parse().unwrap();
        check_range("year", year as i64, 1900, 3000)?;
        let mon: u32 = capture_or(&caps, "mon", 1);
        check_range("month", mon as i64, 1, 12)?;
        let mday: u32 = capture_or(&caps, "mday", 1);
        check_range("day-of-month", mday as i64, 1, 31)?;
        let hour: u32 = capture_or(&caps, "hour", 0);
        check_range("hour", hour as i64, 0, 23)?;
        let min: u32 = capture_or(&caps, "min", 0);
        check_range("minute", min as i64, 0, 59)?;
        let sec: u32 = capture_or(&caps, "sec", 0);
        check_range("second", sec as i64, 0, 60)?;
        let usec = fraction_usec(caps.name("frac").map(|m| m.as_str()));
        let day = md_to_doy(year, mon, mday)?;
        HpTime::from_time(year, day, hour, min, sec, usec)
    }
}

impl Add<i64> for HpTime {
    type Output = HpTime;

    fn add(self, ticks: i64) -> HpTime {
        HpTime::from_ticks(self.ticks + ticks)
    }
}

impl Sub<HpTime> for HpTime {
    type Output = i64;

    fn sub(self, other: HpTime) -> i64 {
        self.ticks - other.ticks
    }
}

fn capture_or(caps: &regex::Captures, name: &str, default: u32) -> u32 {
    caps.name(name)
        .map(|m| m.as_str().parse().unwrap())
        .unwrap_or(default)
}

/// Right-pad fractional-second digits to microseconds, "7" -> 700000.
fn fraction_usec(frac: Option<&str>) -> u32 {
    match frac {
        Some(digits) => {
            let mut padded = digits.to_string();
            while padded.len() < 6 {
                padded.push('0');
            }
            padded.parse().unwrap()
        }
        None => 0,
    }
}

fn check_range(what: &str, value: i64, lo: i64, hi: i64) -> Result<(), MSeedError> {
    if value < lo || value > hi {
        Err(MSeedError::OutOfRange(format!("{} value {}", what, value)))
    } else {
        Ok(())
    }
}

/// Compute month and day-of-month from a year and day-of-year.
pub fn doy_to_md(year: i32, doy: u32) -> Result<(u32, u32), MSeedError> {
    check_range("year", year as i64, 1900, 2100)?;
    let date = NaiveDate::from_yo_opt(year, doy)
        .ok_or_else(|| MSeedError::OutOfRange(format!("day-of-year value {}", doy)))?;
    Ok((date.month(), date.day()))
}

/// Compute the day-of-year from a year, month and day-of-month.
pub fn md_to_doy(year: i32, month: u32, mday: u32) -> Result<u32, MSeedError> {
    check_range("year", year as i64, 1900, 2100)?;
    let date = NaiveDate::from_ymd_opt(year, month, mday)
        .ok_or_else(|| MSeedError::OutOfRange(format!("month {} day {}", month, mday)))?;
    Ok(date.ordinal())
}

/// Nominal sample rate from the FSDH sample rate factor and multiplier.
/// Positive values are rates, negative values are periods, combined
/// multiplicatively.
pub fn nominal_sample_rate(factor: i16, multiplier: i16) -> f64 {
    let mut samprate = 0.0;
    if factor > 0 {
        samprate = factor as f64;
    } else if factor < 0 {
        samprate = -1.0 / factor as f64;
    }
    if multiplier > 0 {
        samprate *= multiplier as f64;
    } else if multiplier < 0 {
        samprate = -1.0 * (samprate / multiplier as f64);
    }
    samprate
}

/// Derive a SEED sample rate factor and multiplier from a double precision
/// rate. Integer rates map directly, other rates go through a rational
/// approximation with the denominator negated to denote division.
pub fn rate_to_factor_multiplier(samprate: f64) -> Result<(i16, i16), MSeedError> {
    if samprate > 32727.0 || samprate < 0.0 {
        return Err(MSeedError::OutOfRange(format!(
            "sample rate value {}",
            samprate
        )));
    }
    if (samprate - samprate.trunc()) < 0.000001 {
        let factor = samprate as i16;
        let multiplier = if factor != 0 { 1 } else { 0 };
        Ok((factor, multiplier))
    } else {
        let (num, den) = rational_approx(samprate, 32727, 1e-12);
        Ok((num as i16, -(den as i16)))
    }
}

/// Find an approximate rational number for a real through continued fraction
/// expansion, keeping numerator and denominator below `maxval`.
pub fn rational_approx(real: f64, maxval: i32, precision: f64) -> (i32, i32) {
    let (pos, mut realj) = if real >= 0.0 {
        (true, real)
    } else {
        (false, -real)
    };
    let preal = realj;

    let mut bj = (realj + precision) as i64;
    realj = 1.0 / (realj - bj as f64);
    let mut aj = bj;
    let mut aj1: i64 = 1;
    let mut bigbj: i64 = 1;
    let mut bigbj1: i64 = 0;
    let mut num = aj;
    let mut den = bigbj;
    let mut pnum = num;
    let mut pden = den;
    if !pos {
        num = -num;
    }

    while (preal - aj as f64 / bigbj as f64).abs() > precision
        && aj < maxval as i64
        && bigbj < maxval as i64
    {
        let aj2 = aj1;
        aj1 = aj;
        let bigbj2 = bigbj1;
        bigbj1 = bigbj;
        bj = (realj + precision) as i64;
        realj = 1.0 / (realj - bj as f64);
        aj = bj.saturating_mul(aj1).saturating_add(aj2);
        bigbj = bj.saturating_mul(bigbj1).saturating_add(bigbj2);
        num = pnum;
        den = pden;
        if !pos {
            num = -num;
        }
        pnum = aj;
        pden = bigbj;
    }

    if pnum < maxval as i64 && pden < maxval as i64 {
        num = pnum;
        den = pden;
        if !pos {
            num = -num;
        }
    }

    (num as i32, den as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btime_round_trip() {
        let b = BTime {
            year: 2004,
            day: 222,
            hour: 16,
            min: 44,
            sec: 57,
            unused: 0,
            fract: 9900,
        };
        let hp = b.to_hptime().unwrap();
        assert_eq!(hp.to_btime().unwrap(), b);
    }

    #[test]
    fn btime_wire_round_trip() {
        let b = BTime {
            year: 2012,
            day: 1,
            hour: 0,
            min: 0,
            sec: 0,
            unused: 0,
            fract: 0,
        };
        let mut buf = [0u8; 10];
        b.write(&mut buf, ByteOrder::Big);
        assert_eq!(BTime::parse(&buf, ByteOrder::Big), b);
        b.write(&mut buf, ByteOrder::Little);
        assert_eq!(BTime::parse(&buf, ByteOrder::Little), b);
        assert_eq!(buf[0], 0xdc); // 2012 = 0x07dc, little endian
    }

    #[test]
    fn epoch_start() {
        let b = BTime {
            year: 1970,
            day: 1,
            ..Default::default()
        };
        assert_eq!(b.to_hptime().unwrap().ticks(), 0);
    }

    #[test]
    fn known_epoch() {
        // 2006-05-03 = day 123, 15:27:08.7 UTC
        let hp = HpTime::parse_seed("2006,123,15:27:08.7").unwrap();
        assert_eq!(hp.ticks(), 1_146_670_028_700_000);
        assert_eq!(
            hp.to_btime().unwrap().seed_string(),
            "2006,123,15:27:08.7000"
        );
        assert_eq!(hp.seed_string().unwrap(), "2006,123,15:27:08.700000");
    }

    #[test]
    fn parse_short_forms() {
        assert_eq!(
            HpTime::parse_seed("2001").unwrap(),
            HpTime::from_time(2001, 1, 0, 0, 0, 0).unwrap()
        );
        assert_eq!(
            HpTime::parse_seed("2001,44,10").unwrap(),
            HpTime::from_time(2001, 44, 10, 0, 0, 0).unwrap()
        );
        assert!(HpTime::parse_seed("2001,444").is_err());
        assert!(HpTime::parse_seed("junk").is_err());
    }

    #[test]
    fn parse_timestr_forms() {
        assert_eq!(
            HpTime::parse_timestr("2006/05/03 15:27:08.7").unwrap(),
            HpTime::parse_seed("2006,123,15:27:08.7").unwrap()
        );
        assert_eq!(
            HpTime::parse_timestr("2006-05-03T15:27:08.7").unwrap(),
            HpTime::parse_seed("2006,123,15:27:08.7").unwrap()
        );
        assert!(HpTime::parse_timestr("2006-13-01").is_err());
    }

    #[test]
    fn negative_times() {
        let hp = HpTime::from_ticks(-1);
        let b = hp.to_btime().unwrap();
        assert_eq!(b.year, 1969);
        assert_eq!(b.day, 365);
        assert_eq!(b.sec, 59);
        assert_eq!(b.fract, 9999);
    }

    #[test]
    fn doy_conversions() {
        assert_eq!(doy_to_md(2004, 366).unwrap(), (12, 31)); // leap year
        assert_eq!(doy_to_md(2005, 59).unwrap(), (2, 28));
        assert_eq!(doy_to_md(2005, 60).unwrap(), (3, 1));
        assert!(doy_to_md(2005, 366).is_err());
        assert_eq!(md_to_doy(2004, 3, 1).unwrap(), 61);
        assert_eq!(md_to_doy(2005, 3, 1).unwrap(), 60);
        assert!(md_to_doy(2005, 2, 29).is_err());
    }

    #[test]
    fn nominal_rates() {
        assert_eq!(nominal_sample_rate(40, 1), 40.0);
        assert_eq!(nominal_sample_rate(-10, 1), 0.1);
        assert_eq!(nominal_sample_rate(20, -5), 4.0);
        assert_eq!(nominal_sample_rate(0, 0), 0.0);
    }

    #[test]
    fn factor_multiplier_round_trip() {
        assert_eq!(rate_to_factor_multiplier(40.0).unwrap(), (40, 1));
        assert_eq!(rate_to_factor_multiplier(0.0).unwrap(), (0, 0));
        let (f, m) = rate_to_factor_multiplier(0.1).unwrap();
        assert!((nominal_sample_rate(f, m) - 0.1).abs() < 1e-9);
        let (f, m) = rate_to_factor_multiplier(33.3333333).unwrap();
        assert!((nominal_sample_rate(f, m) - 33.3333333).abs() < 1e-4);
    }

    #[test]
    fn leap_second_label() {
        let b = BTime {
            year: 2016,
            day: 366,
            hour: 23,
            min: 59,
            sec: 60,
            unused: 0,
            fract: 0,
        };
        // Labelled leap second converts without error and one tick-second
        // beyond :59.
        let hp = b.to_hptime().unwrap();
        let at59 = BTime { sec: 59, ..b };
        assert_eq!(hp - at59.to_hptime().unwrap(), HPTMODULUS);
    }
}
