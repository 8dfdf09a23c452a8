//! Utility functions

use std::path::Path;

/// Name of a dataset created at `path`: its last path component
pub fn dataset_name_from_path(path: &Path) -> String {
    path.components()
        .next_back()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .filter(|name| !name.is_empty() && name != "/" && name != "..")
        .unwrap_or_else(|| "dataset".to_string())
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    match unit {
        0 => format!("{} B", bytes),
        _ => format!("{:.2} {}", size, UNITS[unit]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_name_from_path() {
        assert_eq!(dataset_name_from_path(Path::new("/data/my_ds")), "my_ds");
        assert_eq!(dataset_name_from_path(Path::new("/data/my_ds/")), "my_ds");
        assert_eq!(dataset_name_from_path(Path::new("relative/ds/.")), "ds");
        assert_eq!(dataset_name_from_path(Path::new("/")), "dataset");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
