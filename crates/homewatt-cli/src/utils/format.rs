/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an energy reading, switching to kW above 1000 W
pub fn format_watts(watts: f64) -> String {
    if watts.abs() >= 1000.0 {
        format!("{:.2} kW", watts / 1000.0)
    } else {
        format!("{:.2} W", watts)
    }
}

/// Horizontal bar scaled so `max` fills `width` cells
pub fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 || value <= 0.0 || !value.is_finite() {
        return String::new();
    }
    let cells = ((value / max) * width as f64).round() as usize;
    "█".repeat(cells.clamp(1, width))
}

/// Compact "1h 05m" / "42m" / "30s" for a number of seconds
pub fn format_duration(secs: i64) -> String {
    if secs <= 0 {
        return "0s".to_string();
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Kühlschrank", 6), "Küh...");
    }

    #[test]
    fn test_format_watts() {
        assert_eq!(format_watts(120.5), "120.50 W");
        assert_eq!(format_watts(1250.0), "1.25 kW");
        assert_eq!(format_watts(0.0), "0.00 W");
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(50.0, 100.0, 10), "█████");
        assert_eq!(bar(100.0, 100.0, 10).chars().count(), 10);
        assert_eq!(bar(0.1, 100.0, 10), "█"); // never invisible
        assert_eq!(bar(0.0, 100.0, 10), "");
        assert_eq!(bar(5.0, 0.0, 10), "");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(3900), "1h 05m");
        assert_eq!(format_duration(2520), "42m");
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(-5), "0s");
    }
}
