//! Plain-text rendering of devices, usage charts and the conversation.

use homewatt_core::models::{DevicePublic, DeviceStats};
use homewatt_core::{Message, Role};

use crate::utils::{bar, format_watts, truncate_string};

/// Width of the usage bars in the stats chart
const CHART_WIDTH: usize = 40;

/// Maximum width of the device name column
const NAME_WIDTH: usize = 24;

/// A device with whatever stats could be fetched for it
pub struct DeviceRow {
    pub device: DevicePublic,
    pub stats: Option<DeviceStats>,
}

pub fn devices_table(rows: &[DeviceRow]) -> String {
    if rows.is_empty() {
        return "No devices yet. Add one with `homewatt add-device <name>`.".to_string();
    }

    let mut out = format!(
        "{:<name$}  {:<10}  {:>12}  {:>12}  {}\n",
        "NAME",
        "TYPE",
        "PEAK",
        "TOTAL",
        "ID",
        name = NAME_WIDTH
    );
    for row in rows {
        let (peak, total) = match &row.stats {
            Some(stats) => (
                stats.peak().map(format_watts).unwrap_or_else(|| "-".to_string()),
                format_watts(stats.total_energy()),
            ),
            None => ("?".to_string(), "?".to_string()),
        };
        out.push_str(&format!(
            "{:<name$}  {:<10}  {:>12}  {:>12}  {}\n",
            truncate_string(&row.device.name, NAME_WIDTH),
            truncate_string(&row.device.kind, 10),
            peak,
            total,
            row.device.id,
            name = NAME_WIDTH
        ));
    }
    out
}

pub fn stats_chart(stats: &DeviceStats) -> String {
    let mut out = String::new();
    match stats.time_period_days {
        Some(days) => out.push_str(&format!(
            "Hourly energy usage for device {} over the last {} days\n\n",
            stats.device_id, days
        )),
        None => out.push_str(&format!("Hourly energy usage for device {}\n\n", stats.device_id)),
    }

    if stats.hourly_usage.is_empty() {
        out.push_str("No hourly readings in this period.\n");
    } else {
        let max = stats.peak().unwrap_or(0.0);
        for hour in &stats.hourly_usage {
            out.push_str(&format!(
                "{:<13} {:<width$} {}\n",
                hour.label(),
                bar(hour.total_energy, max, CHART_WIDTH),
                format_watts(hour.total_energy),
                width = CHART_WIDTH
            ));
        }
    }

    let summary: Vec<String> = [
        ("min", stats.min_usage),
        ("avg", stats.avg_usage),
        ("max", stats.max_usage),
    ]
    .iter()
    .filter_map(|(label, value)| value.map(|v| format!("{} {}", label, format_watts(v))))
    .collect();
    if !summary.is_empty() {
        out.push_str(&format!("\n{}\n", summary.join("  ")));
    }
    out
}

pub fn transcript(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No conversation yet. Ask something with `homewatt ask <question>`.".to_string();
    }
    messages
        .iter()
        .map(|m| match m.role {
            Role::User => format!("> {}", m.content),
            Role::Assistant => format!("{}: {}", m.role, m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use homewatt_core::models::HourlyUsage;

    fn device(name: &str) -> DevicePublic {
        DevicePublic {
            id: "d1".to_string(),
            name: name.to_string(),
            kind: "APPLIANCE".to_string(),
            owner_id: "u1".to_string(),
        }
    }

    #[test]
    fn test_devices_table_marks_missing_stats() {
        let rows = vec![DeviceRow {
            device: device("Fridge"),
            stats: None,
        }];
        let table = devices_table(&rows);
        assert!(table.starts_with("NAME"));
        assert!(table.contains("Fridge"));
        assert!(table.contains('?'));
    }

    #[test]
    fn test_empty_devices_hint() {
        assert!(devices_table(&[]).contains("add-device"));
    }

    #[test]
    fn test_stats_chart_scales_to_peak() {
        let stats = DeviceStats {
            device_id: "d1".to_string(),
            time_period_days: Some(7),
            hourly_usage: vec![
                HourlyUsage {
                    date: "2025-03-04".to_string(),
                    hour: 1,
                    total_energy: 100.0,
                },
                HourlyUsage {
                    date: "2025-03-04".to_string(),
                    hour: 2,
                    total_energy: 50.0,
                },
            ],
            ..Default::default()
        };
        let chart = stats_chart(&stats);
        assert!(chart.contains("last 7 days"));
        assert!(chart.contains(&"█".repeat(CHART_WIDTH)));
        assert!(chart.contains("Mar 04 02:00"));
        assert!(chart.contains("50.00 W"));
    }

    #[test]
    fn test_transcript() {
        let messages = vec![
            Message {
                id: "1".to_string(),
                role: Role::User,
                content: "hi".to_string(),
            },
            Message {
                id: "2".to_string(),
                role: Role::Assistant,
                content: "hello".to_string(),
            },
        ];
        assert_eq!(transcript(&messages), "> hi\nAssistant: hello");
    }
}
