use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// 計算資料夾中的檔案數量
#[must_use]
pub fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

/// 刪除一次錄製的暫存資料夾，回傳刪除的檔案數
pub fn remove_run_artifacts(run_dir: &Path) -> Result<usize> {
    if !run_dir.exists() {
        return Ok(0);
    }

    let removed = count_files(run_dir);
    fs::remove_dir_all(run_dir)
        .with_context(|| format!("無法刪除暫存資料夾: {}", run_dir.display()))?;
    Ok(removed)
}

/// 清除所有殘留的錄製暫存資料夾
pub fn remove_all_runs(runs_root: &Path) -> Result<usize> {
    if !runs_root.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(runs_root)
        .with_context(|| format!("無法讀取暫存資料夾: {}", runs_root.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            removed += remove_run_artifacts(&path)?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_run_artifacts() {
        let root = tempdir().unwrap();
        let run_dir = root.path().join("run-1");
        fs::create_dir_all(run_dir.join("nested")).unwrap();
        fs::write(run_dir.join("schedule.json"), "{}").unwrap();
        fs::write(run_dir.join("nested").join("extra.txt"), "x").unwrap();

        assert_eq!(remove_run_artifacts(&run_dir).unwrap(), 2);
        assert!(!run_dir.exists());
        assert_eq!(remove_run_artifacts(&run_dir).unwrap(), 0);
    }

    #[test]
    fn test_remove_all_runs_keeps_root() {
        let root = tempdir().unwrap();
        for name in ["a", "b"] {
            let dir = root.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("schedule.json"), "{}").unwrap();
        }

        assert_eq!(remove_all_runs(root.path()).unwrap(), 2);
        assert!(root.path().exists());
        assert_eq!(count_files(root.path()), 0);
    }
}
