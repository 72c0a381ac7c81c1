use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use tokio::fs;

/// Creates the directory that will hold `file_path`, if it is missing.
/// A bare file name needs nothing.
pub async fn ensure_parent_dir(file_path: &Path) -> Result<()> {
    let Some(dir) = file_path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    if fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    info!("Created directory {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_nested_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a").join("b").join("console_config.json");

        ensure_parent_dir(&file).await.unwrap();
        assert!(file.parent().unwrap().is_dir());
        ensure_parent_dir(&file).await.unwrap();
    }

    #[tokio::test]
    async fn test_bare_file_name() {
        ensure_parent_dir(Path::new("console_config.json")).await.unwrap();
    }
}
