//! Core data model: sensor observations, pollutant identifiers, and the
//! ISPU category enumeration.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// The six pollutant concentrations tracked per observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pollutant {
    Pm10,
    Pm25,
    So2,
    Co,
    O3,
    No2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::So2,
        Pollutant::Co,
        Pollutant::O3,
        Pollutant::No2,
    ];

    /// Column name used in every persisted table.
    pub fn column_name(self) -> &'static str {
        match self {
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm25 => "pm25",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
        }
    }
}

/// Discrete air-quality index label assigned to an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IspuCategory {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    NoData,
}

impl IspuCategory {
    pub const ALL: [IspuCategory; 5] = [
        IspuCategory::Good,
        IspuCategory::Moderate,
        IspuCategory::Unhealthy,
        IspuCategory::VeryUnhealthy,
        IspuCategory::NoData,
    ];

    /// Canonical label as it appears in the source data.
    pub fn label(self) -> &'static str {
        match self {
            IspuCategory::Good => "BAIK",
            IspuCategory::Moderate => "SEDANG",
            IspuCategory::Unhealthy => "TIDAK SEHAT",
            IspuCategory::VeryUnhealthy => "SANGAT TIDAK SEHAT",
            IspuCategory::NoData => "TIDAK ADA DATA",
        }
    }

    /// Parses a raw label by case-insensitive substring match.
    ///
    /// Longest label is tested first so "SANGAT TIDAK SEHAT" never falls
    /// into the "TIDAK SEHAT" branch. Unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let upper = label.trim().to_uppercase();
        if upper.contains("SANGAT TIDAK SEHAT") {
            Some(IspuCategory::VeryUnhealthy)
        } else if upper.contains("TIDAK SEHAT") {
            Some(IspuCategory::Unhealthy)
        } else if upper.contains("TIDAK ADA DATA") {
            Some(IspuCategory::NoData)
        } else if upper.contains("BAIK") {
            Some(IspuCategory::Good)
        } else if upper.contains("SEDANG") {
            Some(IspuCategory::Moderate)
        } else {
            None
        }
    }
}

/// One sensor reading for one station at one timestamp, as deserialized
/// from the merged observation CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "periode_data", default)]
    pub period: Option<String>,

    #[serde(rename = "tanggal_lengkap", with = "timestamp_format")]
    pub timestamp: NaiveDateTime,

    // Source calendar parts arrive as floats when the exporting tool had
    // gaps in the column; they are informational only.
    #[serde(rename = "tahun", default)]
    pub year: Option<f64>,
    #[serde(rename = "bulan", default)]
    pub month: Option<f64>,
    #[serde(rename = "hari", default)]
    pub day: Option<f64>,

    #[serde(rename = "stasiun")]
    pub station: String,

    #[serde(default)]
    pub pm10: Option<f64>,
    #[serde(default)]
    pub pm25: Option<f64>,
    #[serde(default)]
    pub so2: Option<f64>,
    #[serde(default)]
    pub co: Option<f64>,
    #[serde(default)]
    pub o3: Option<f64>,
    #[serde(default)]
    pub no2: Option<f64>,

    #[serde(rename = "max_ispu", default)]
    pub max_ispu: Option<f64>,

    #[serde(rename = "parameter_kritis", default)]
    pub critical_parameter: Option<String>,

    #[serde(rename = "kategori", default)]
    pub category: String,
}

impl Observation {
    pub fn pollutant(&self, p: Pollutant) -> Option<f64> {
        match p {
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm25 => self.pm25,
            Pollutant::So2 => self.so2,
            Pollutant::Co => self.co,
            Pollutant::O3 => self.o3,
            Pollutant::No2 => self.no2,
        }
    }

    pub fn set_pollutant(&mut self, p: Pollutant, value: Option<f64>) {
        match p {
            Pollutant::Pm10 => self.pm10 = value,
            Pollutant::Pm25 => self.pm25 = value,
            Pollutant::So2 => self.so2 = value,
            Pollutant::Co => self.co = value,
            Pollutant::O3 => self.o3 = value,
            Pollutant::No2 => self.no2 = value,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    /// The (station, date, hour) primary key of the time series.
    pub fn key(&self) -> (&str, NaiveDate, u32) {
        (self.station.as_str(), self.date(), self.hour())
    }

    pub fn parsed_category(&self) -> Option<IspuCategory> {
        IspuCategory::parse(&self.category)
    }
}

/// Timestamp (de)serialization for observation tables.
///
/// Daily-resolution sources carry bare dates; those parse to midnight.
pub mod timestamp_format {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const DATE_FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unreadable date: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let trimmed = raw.trim();
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT) {
            return Some(ts);
        }
        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_exact_labels() {
        assert_eq!(IspuCategory::parse("BAIK"), Some(IspuCategory::Good));
        assert_eq!(IspuCategory::parse("SEDANG"), Some(IspuCategory::Moderate));
        assert_eq!(
            IspuCategory::parse("TIDAK SEHAT"),
            Some(IspuCategory::Unhealthy)
        );
        assert_eq!(
            IspuCategory::parse("TIDAK ADA DATA"),
            Some(IspuCategory::NoData)
        );
    }

    #[test]
    fn test_parse_category_longest_label_wins() {
        assert_eq!(
            IspuCategory::parse("SANGAT TIDAK SEHAT"),
            Some(IspuCategory::VeryUnhealthy)
        );
    }

    #[test]
    fn test_parse_category_is_case_insensitive_and_trims() {
        assert_eq!(
            IspuCategory::parse("  tidak sehat "),
            Some(IspuCategory::Unhealthy)
        );
    }

    #[test]
    fn test_parse_category_unknown_is_none() {
        assert_eq!(IspuCategory::parse("HUJAN"), None);
        assert_eq!(IspuCategory::parse(""), None);
    }

    #[test]
    fn test_timestamp_parse_date_only_defaults_to_midnight() {
        let ts = timestamp_format::parse("2021-06-01").unwrap();
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2021-06-01 00:00:00");
    }

    #[test]
    fn test_timestamp_parse_full_datetime() {
        let ts = timestamp_format::parse("2021-06-01 13:00:00").unwrap();
        assert_eq!(ts.hour(), 13);
    }

    #[test]
    fn test_timestamp_parse_garbage_is_none() {
        assert!(timestamp_format::parse("not-a-date").is_none());
    }
}
