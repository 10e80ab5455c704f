//! Human-scaled units for log lines.

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if value >= TB {
        format!("{:.2} TB", value / TB)
    } else if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Bytes per second expressed in MB/s
pub fn mb_per_sec(bytes_per_sec: f64) -> f64 {
    bytes_per_sec / MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn megabytes_per_second() {
        assert_eq!(mb_per_sec(1024.0 * 1024.0), 1.0);
        assert_eq!(format!("{:.2}", mb_per_sec(0.0)), "0.00");
    }
}
