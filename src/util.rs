// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::prelude::*;
use anyhow::{Context, Result};

pub fn read_file(path: &str) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {}", path))?;

    Ok(buf)
}

pub fn read_file_str(path: &str) -> Result<String> {
    let content = read_file(path)?;
    let str = String::from_utf8(content)
        .with_context(|| format!("{} is not valid UTF-8", path))?;
    Ok(str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_file() {
        let err = read_file("/nonexistent/goldfish-rtc.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open /nonexistent/goldfish-rtc.yaml"));
    }

    #[test]
    fn test_read_file_str() {
        let path = std::env::temp_dir().join(format!("goldfish-rtc-util-{}.yaml", std::process::id()));
        std::fs::write(&path, "rtc: { base: 0x1000, irq: 1 }\n").unwrap();
        let content = read_file_str(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(content.starts_with("rtc:"));
    }
}
