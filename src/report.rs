use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::AppResult;

/// Result of the keywords flow.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct KeywordReport {
    pub search: String,
    pub keywords: Vec<Vec<String>>,
    /// One entry per keyword set; `None` where the model call failed.
    pub recommendations: Vec<Option<String>>,
    #[serde(with = "crate::serde_helpers::duration")]
    pub runtime: Duration,
}

/// Result of the check flow.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CheckReport {
    pub search: String,
    pub recommendation: String,
    pub most_relevant_site_contents: Vec<String>,
    pub recommendation_check_results: String,
    #[serde(with = "crate::serde_helpers::duration")]
    pub runtime: Duration,
}

/// Write `obj` as pretty JSON, replacing whatever `output` held before.
#[tracing::instrument(name = "Saving output to disk", level = "debug", skip(obj))]
pub async fn write_json_output<P: AsRef<Path> + std::fmt::Debug, S: Serialize>(
    output: P,
    obj: &S,
) -> AppResult<()> {
    let data = serde_json::to_string_pretty(obj)?;
    write_file(output, data).await
}

async fn write_file<P: AsRef<Path> + std::fmt::Debug>(output: P, data: String) -> AppResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&output)
        .await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await?;
    debug!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_keyword_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        let report = KeywordReport {
            search: "running shoes".to_string(),
            keywords: vec![vec!["Free shipping".to_string(), "Returns".to_string()]],
            recommendations: vec![None],
            runtime: Duration::from_millis(1500),
        };
        write_json_output(&path, &report).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["search"], "running shoes");
        assert_eq!(value["keywords"][0][1], "Returns");
        assert!(value["recommendations"][0].is_null());
        assert_eq!(value["runtime"], "1s 500ms");
        assert!(raw.contains("\n  \"search\""));
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check.json");
        std::fs::write(&path, "x".repeat(4096)).unwrap();

        let report = CheckReport {
            search: "plumber".to_string(),
            recommendation: "Add a booking link".to_string(),
            most_relevant_site_contents: vec!["Book now".to_string()],
            recommendation_check_results: "Yes".to_string(),
            runtime: Duration::from_secs(3),
        };
        write_json_output(&path, &report).await.unwrap();

        let back: CheckReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
