use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// 確認輸入檔案存在且是一般檔案
pub fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("檔案不存在: {}", path.display());
    }
    if !path.is_file() {
        bail!("路徑不是檔案: {}", path.display());
    }
    Ok(())
}

/// 建立資料夾（包含上層），已存在時不做任何事
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        bail!("路徑已存在但不是資料夾: {}", path.display());
    }
    fs::create_dir_all(path).with_context(|| format!("無法建立資料夾: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_directory_exists_creates_nested() {
        let root = tempdir().unwrap();
        let nested = root.path().join("a").join("b");

        ensure_directory_exists(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_directory_exists(&nested).unwrap();
    }

    #[test]
    fn test_ensure_directory_rejects_file() {
        let root = tempdir().unwrap();
        let file = root.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        assert!(ensure_directory_exists(&file).is_err());
        assert!(validate_file_exists(&file).is_ok());
        assert!(validate_file_exists(&root.path().join("missing.json")).is_err());
    }
}
