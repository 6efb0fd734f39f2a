//! The single stdout line a worker prints on success.

use serde::{Deserialize, Serialize};

pub const RESULT_PREFIX: &str = "RESULT ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub order_id: String,
    pub scene_id: String,
    pub product_location: String,
    pub checksum_location: String,
}

impl WorkerResult {
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}{}", RESULT_PREFIX, serde_json::to_string(self)?))
    }
}

/// The worker result in `output`, if there is exactly one result line and
/// it parses.
pub fn parse_result_line(output: &str) -> Option<WorkerResult> {
    let mut lines = output
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix(RESULT_PREFIX));
    let line = lines.next()?;
    if lines.next().is_some() {
        return None;
    }
    serde_json::from_str(line.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> WorkerResult {
        WorkerResult {
            order_id: "ops-101914-093015".to_string(),
            scene_id: "LT50440341996220XXX01".to_string(),
            product_location: "/cache/orders/ops-101914-093015/p.tar.gz".to_string(),
            checksum_location: "/cache/orders/ops-101914-093015/p.md5".to_string(),
        }
    }

    #[test]
    fn test_parse_single_line() {
        let line = result().to_line().unwrap();
        assert!(line.starts_with("RESULT {"));
        assert_eq!(parse_result_line(&format!("{}\n", line)), Some(result()));
    }

    #[test]
    fn test_rejects_missing_duplicate_or_garbled() {
        let line = result().to_line().unwrap();
        assert_eq!(parse_result_line(""), None);
        assert_eq!(parse_result_line("processing done\n"), None);
        assert_eq!(parse_result_line(&format!("{}\n{}\n", line, line)), None);
        assert_eq!(parse_result_line("RESULT {not json"), None);
    }
}
