use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_data_dir(data_dir: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(data_dir)?;
    Ok(data_dir.to_path_buf())
}

pub fn ensure_export_dir(export_dir: &Path, stamp: &str) -> std::io::Result<PathBuf> {
    let dir = export_dir.join(stamp);
    ensure_dir(&dir)?;
    Ok(dir)
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dirs() {
        let root = tempfile::tempdir().unwrap();
        let data = ensure_data_dir(&root.path().join("data")).unwrap();
        assert!(data.is_dir());
        let export = ensure_export_dir(&data.join("exports"), "20250101-120000").unwrap();
        assert!(export.ends_with("exports/20250101-120000"));
        assert!(export.is_dir());
    }
}
