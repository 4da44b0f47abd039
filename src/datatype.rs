// used for timestamps and relative date arithmetic
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
// used for decimal numbers
use bigdecimal::BigDecimal;
// used to recognize date and interval specifications
use lazy_static::lazy_static;
use regex::Regex;

// used when parsing a string to a BigDecimal
use std::str::FromStr;
// used to print out readable forms of a data type
use std::fmt;
// multilink values are ordered sets of identifiers
use std::collections::BTreeSet;
// used to overload common operations for datatypes
use std::ops;

use crate::schema::Id;

lazy_static! {
    static ref DATE_SPEC: Regex = Regex::new(
        r"(?x)^
        (?:
            (?P<now>\.)
          | (?:(?P<year>\d{4})-)?(?P<month>\d{1,2})-(?P<day>\d{1,2})
            (?:\.(?P<dhour>\d{1,2}):(?P<dminute>\d{2})(?::(?P<dsecond>\d{2}))?)?
          | (?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?
        )
        \s*(?:(?P<sign>[+-])\s*(?P<offset>.+))?
        $"
    ).unwrap();
    static ref INTERVAL_SPEC: Regex = Regex::new(
        r"(?x)^\s*
        (?P<sign>[+-])?\s*
        (?:(?P<years>\d+)\s*y)?\s*
        (?:(?P<months>\d+)\s*m)?\s*
        (?:(?P<weeks>\d+)\s*w)?\s*
        (?:(?P<days>\d+)\s*d)?\s*
        (?:(?P<hours>\d+):(?P<minutes>\d{1,2})(?::(?P<seconds>\d{1,2}))?)?
        \s*$"
    ).unwrap();
}

// ------------- Value -------------
/// A schema-typed property value, one variant per property kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Number(Decimal),
    Boolean(bool),
    Date(Date),
    Interval(Interval),
    Secret(Credential),
    Link(Id),
    MultiLink(BTreeSet<Id>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "String",
            Value::Number(_) => "Number",
            Value::Boolean(_) => "Boolean",
            Value::Date(_) => "Date",
            Value::Interval(_) => "Interval",
            Value::Secret(_) => "Password",
            Value::Link(_) => "Link",
            Value::MultiLink(_) => "Multilink",
        }
    }
    /// The identifiers referenced by a Link or MultiLink, empty otherwise.
    pub fn references(&self) -> BTreeSet<Id> {
        match self {
            Value::Link(id) => BTreeSet::from([*id]),
            Value::MultiLink(ids) => ids.clone(),
            _ => BTreeSet::new(),
        }
    }
}

// ------------- Decimal -------------
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn parse(s: &str) -> Option<Decimal> {
        BigDecimal::from_str(s.trim()).ok().map(Decimal)
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ------------- Date -------------
/// A UTC instant with whole-second precision.
#[derive(Eq, PartialEq, PartialOrd, Ord, Debug, Hash, Clone, Copy)]
pub struct Date(NaiveDateTime);

impl Date {
    pub const FORMAT: &'static str = "%Y-%m-%d.%H:%M:%S";
    /// Years outside this range have no four-digit canonical form.
    pub const YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

    pub fn now() -> Date {
        Date::from_naive(Utc::now().naive_utc())
    }
    pub fn from_naive(moment: NaiveDateTime) -> Date {
        Date(moment.with_nanosecond(0).unwrap_or(moment))
    }
    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
    /// Parses only the canonical `YYYY-MM-DD.HH:MM:SS` form.
    pub fn parse_canonical(s: &str) -> Option<Date> {
        NaiveDateTime::parse_from_str(s.trim(), Self::FORMAT)
            .ok()
            .filter(|moment| Self::YEARS.contains(&moment.year()))
            .map(Date)
    }
    /// Parses an absolute, partial or relative date specification against
    /// the current instant.
    pub fn parse(spec: &str) -> Option<Date> {
        Self::parse_relative_to(spec, Utc::now().naive_utc())
    }
    /// Like [`Date::parse`] with an explicit "now". A bare time means today,
    /// a bare month-day means this year, `.` means now, and any base may be
    /// followed by `+ interval` or `- interval`.
    pub fn parse_relative_to(spec: &str, now: NaiveDateTime) -> Option<Date> {
        let spec = spec.trim();
        // a lone offset such as "-3d" is relative to now
        let spec = if spec.starts_with('-') || spec.starts_with('+') {
            format!(". {spec}")
        } else {
            spec.to_string()
        };
        let captures = DATE_SPEC.captures(&spec)?;
        let number = |name: &str| captures.name(name).map(|m| m.as_str().parse::<u32>().ok());
        let base = if captures.name("now").is_some() {
            now
        } else if let Some(month) = number("month") {
            let year = match captures.name("year") {
                Some(y) => y.as_str().parse::<i32>().ok()?,
                None => now.year(),
            };
            let date = NaiveDate::from_ymd_opt(year, month?, number("day")??)?;
            let hour = number("dhour").unwrap_or(Some(0))?;
            let minute = number("dminute").unwrap_or(Some(0))?;
            let second = number("dsecond").unwrap_or(Some(0))?;
            date.and_hms_opt(hour, minute, second)?
        } else {
            let hour = number("hour")??;
            let minute = number("minute")??;
            let second = number("second").unwrap_or(Some(0))?;
            now.date().and_hms_opt(hour, minute, second)?
        };
        let moment = match captures.name("offset") {
            Some(offset) => {
                let mut interval = Interval::parse(offset.as_str())?;
                if captures.name("sign").map(|s| s.as_str()) == Some("-") {
                    interval = interval.negated();
                }
                interval.add_to(base)?
            }
            None => base,
        };
        if !Self::YEARS.contains(&moment.year()) {
            return None;
        }
        Some(Date::from_naive(moment))
    }
}
impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

// ------------- Interval -------------
/// A signed calendar interval. Weeks are folded into days and the clock
/// part is kept as a number of seconds, so equal intervals compare equal.
#[derive(Eq, PartialEq, Debug, Hash, Clone, Copy, Default)]
pub struct Interval {
    negative: bool,
    years: u32,
    months: u32,
    days: u32,
    seconds: u64,
}

impl Interval {
    pub fn new(negative: bool, years: u32, months: u32, days: u32, seconds: u64) -> Interval {
        let zero = years == 0 && months == 0 && days == 0 && seconds == 0;
        Interval {
            negative: negative && !zero,
            years,
            months,
            days,
            seconds,
        }
    }
    pub fn parse(spec: &str) -> Option<Interval> {
        let captures = INTERVAL_SPEC.captures(spec)?;
        let parts = ["years", "months", "weeks", "days", "hours", "minutes", "seconds"];
        if parts.iter().all(|p| captures.name(p).is_none()) {
            return None;
        }
        let number = |name: &str| -> Option<u64> {
            match captures.name(name) {
                Some(m) => m.as_str().parse::<u64>().ok(),
                None => Some(0),
            }
        };
        let minutes = number("minutes")?;
        let seconds = number("seconds")?;
        if minutes > 59 || seconds > 59 {
            return None;
        }
        let days = number("weeks")?.checked_mul(7)?.checked_add(number("days")?)?;
        Some(Interval::new(
            captures.name("sign").map(|s| s.as_str()) == Some("-"),
            u32::try_from(number("years")?).ok()?,
            u32::try_from(number("months")?).ok()?,
            u32::try_from(days).ok()?,
            number("hours")?.checked_mul(3600)?.checked_add(minutes * 60 + seconds)?,
        ))
    }
    pub fn negated(self) -> Interval {
        Interval::new(!self.negative, self.years, self.months, self.days, self.seconds)
    }
    pub fn is_negative(&self) -> bool {
        self.negative
    }
    /// Shifts `moment` by this interval, `None` on calendar overflow.
    pub fn add_to(&self, moment: NaiveDateTime) -> Option<NaiveDateTime> {
        let months = Months::new(self.years.checked_mul(12)?.checked_add(self.months)?);
        let clock = TimeDelta::try_days(i64::from(self.days))?
            .checked_add(&TimeDelta::try_seconds(i64::try_from(self.seconds).ok()?)?)?;
        if self.negative {
            moment.checked_sub_months(months)?.checked_sub_signed(clock)
        } else {
            moment.checked_add_months(months)?.checked_add_signed(clock)
        }
    }
}
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = Vec::new();
        if self.years > 0 {
            parts.push(format!("{}y", self.years));
        }
        if self.months > 0 {
            parts.push(format!("{}m", self.months));
        }
        if self.days > 0 {
            parts.push(format!("{}d", self.days));
        }
        if self.seconds > 0 || parts.is_empty() {
            parts.push(format!(
                "{}:{:02}:{:02}",
                self.seconds / 3600,
                self.seconds % 3600 / 60,
                self.seconds % 60
            ));
        }
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{}", parts.join(" "))
    }
}

// ------------- Credential -------------
/// Password material. Freshly decoded text is `Plain`; the storage engine
/// keeps the `Hashed` form, written as `{SCHEME}digest`.
#[derive(Eq, PartialEq, Debug, Hash, Clone)]
pub enum Credential {
    Plain(String),
    Hashed { scheme: String, digest: String },
}

impl Credential {
    pub const SCHEME: &'static str = "BLAKE3";

    pub fn hashed(&self) -> Credential {
        match self {
            Credential::Plain(material) => Credential::Hashed {
                scheme: Self::SCHEME.to_string(),
                digest: blake3::hash(material.as_bytes()).to_hex().to_string(),
            },
            hashed => hashed.clone(),
        }
    }
    /// Parses the stored `{SCHEME}digest` form.
    pub fn from_stored(text: &str) -> Option<Credential> {
        let rest = text.strip_prefix('{')?;
        let (scheme, digest) = rest.split_once('}')?;
        if scheme.is_empty() || digest.is_empty() {
            return None;
        }
        Some(Credential::Hashed {
            scheme: scheme.to_string(),
            digest: digest.to_string(),
        })
    }
    /// The stored form, hashing plain material first.
    pub fn stored(&self) -> String {
        match self {
            Credential::Hashed { scheme, digest } => format!("{{{scheme}}}{digest}"),
            Credential::Plain(_) => self.hashed().stored(),
        }
    }
    pub fn verify(&self, attempt: &str) -> bool {
        self.hashed() == Credential::Plain(attempt.to_string()).hashed()
    }
}
