//! VPN manager log signal

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ConnectionSignal;

const INITIAL_TAIL_WINDOW: u64 = 8 * 1024;

/// Read up to `max_lines` trailing lines without loading the whole file
pub fn read_tail_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut window = INITIAL_TAIL_WINDOW;

    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::new();
        (&mut file).take(len - start).read_to_end(&mut buf)?;

        let text = String::from_utf8_lossy(&buf);
        let mut lines: Vec<&str> = text.lines().collect();

        if start > 0 {
            // The first line is cut off; widen until enough whole lines fit
            if lines.len() <= max_lines {
                window = window.saturating_mul(2);
                continue;
            }
            lines.remove(0);
        }

        let skip = lines.len().saturating_sub(max_lines);
        return Ok(lines[skip..].iter().map(|line| line.to_string()).collect());
    }
}

/// Succeeds when the VPN manager logs a `Connected` line naming the profile
pub struct LogTailSignal {
    path: PathBuf,
    tail_lines: usize,
    last_line: String,
}

impl LogTailSignal {
    pub fn new<P: Into<PathBuf>>(path: P, tail_lines: usize) -> Self {
        Self {
            path: path.into(),
            tail_lines,
            last_line: String::new(),
        }
    }
}

impl ConnectionSignal for LogTailSignal {
    fn name(&self) -> &'static str {
        "vpn-manager-log"
    }

    fn check(&mut self, target_profile: &str) -> Option<String> {
        let lines = match read_tail_lines(&self.path, self.tail_lines) {
            Ok(lines) => lines,
            Err(e) => {
                debug!("VPN manager log {} unavailable: {}", self.path.display(), e);
                return None;
            }
        };

        if let Some(newest) = lines.iter().rev().map(|l| l.trim()).find(|l| !l.is_empty()) {
            self.last_line = newest.to_string();
        }

        lines
            .iter()
            .rev()
            .any(|line| line.contains("Connected") && line.contains(target_profile))
            .then(|| "VPN Manager reports Connected".to_string())
    }

    fn hint(&self) -> Option<String> {
        Some(self.last_line.clone()).filter(|line| !line.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    #[test]
    fn test_tail_of_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.log");
        std::fs::write(&path, "one\ntwo\nthree\n").unwrap();

        assert_eq!(read_tail_lines(&path, 2).unwrap(), vec!["two", "three"]);
        assert_eq!(read_tail_lines(&path, 80).unwrap().len(), 3);
    }

    #[test]
    fn test_tail_of_large_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.log");
        let mut content = String::new();
        for i in 0..5_000 {
            writeln!(content, "line {i:05} {}", "x".repeat(40)).unwrap();
        }
        std::fs::write(&path, content).unwrap();

        let tail = read_tail_lines(&path, 80).unwrap();
        assert_eq!(tail.len(), 80);
        assert!(tail[0].starts_with("line 04920"));
        assert!(tail[79].starts_with("line 04999"));
    }

    #[test]
    fn test_signal_needs_connected_and_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("service.log");
        std::fs::write(
            &path,
            "Connecting to UK_Docklands (UDP)\nConnected to NL_Amsterdam\n",
        )
        .unwrap();

        let mut signal = LogTailSignal::new(&path, 80);
        assert_eq!(signal.check("UK_Docklands (UDP)"), None);
        assert_eq!(signal.hint().as_deref(), Some("Connected to NL_Amsterdam"));

        std::fs::write(
            &path,
            "Connecting to UK_Docklands (UDP)\nConnected to UK_Docklands (UDP)\nHeartbeat\n",
        )
        .unwrap();
        assert!(signal.check("UK_Docklands (UDP)").is_some());
    }

    #[test]
    fn test_missing_log_is_no_signal() {
        let dir = TempDir::new().unwrap();
        let mut signal = LogTailSignal::new(dir.path().join("absent.log"), 80);
        assert_eq!(signal.check("uk"), None);
        assert_eq!(signal.hint(), None);
    }
}
