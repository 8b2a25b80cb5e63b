use serde::{Deserialize, Serialize};

/// Type sent when creating a device without one
pub const DEFAULT_DEVICE_TYPE: &str = "APPLIANCE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DevicePublic {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default = "default_device_type")]
    pub kind: String,
    pub owner_id: String,
}

fn default_device_type() -> String {
    DEFAULT_DEVICE_TYPE.to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceCreate<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

/// Energy used by a device in one hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct HourlyUsage {
    pub date: String,
    pub hour: u32,
    pub total_energy: f64,
}

impl HourlyUsage {
    /// "Mar 04 13:00" style label for charts
    pub fn label(&self) -> String {
        match chrono::NaiveDate::parse_from_str(&self.date.chars().take(10).collect::<String>(), "%Y-%m-%d") {
            Ok(date) => format!("{} {:02}:00", date.format("%b %d"), self.hour),
            Err(_) => format!("{} {:02}:00", self.date, self.hour),
        }
    }
}

/// Usage statistics for one device. The backend has shipped a few shapes of
/// this payload, so every field tolerates being absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DeviceStats {
    pub device_id: String,
    #[serde(default)]
    pub time_period_days: Option<u32>,
    #[serde(default)]
    pub hourly_usage: Vec<HourlyUsage>,
    #[serde(default)]
    pub max_usage: Option<f64>,
    #[serde(default)]
    pub min_usage: Option<f64>,
    #[serde(default)]
    pub avg_usage: Option<f64>,
}

impl DeviceStats {
    pub fn total_energy(&self) -> f64 {
        self.hourly_usage.iter().map(|h| h.total_energy).sum()
    }

    /// Highest hourly reading, falling back to the server's `max_usage`
    pub fn peak(&self) -> Option<f64> {
        self.hourly_usage
            .iter()
            .map(|h| h.total_energy)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .or(self.max_usage)
    }
}
