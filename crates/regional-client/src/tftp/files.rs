/// TFTP 根目录文件管理
///
/// 路径解析限制在根目录之内，越界请求一律拒绝

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::Serialize;

/// 文件元信息（健康检查接口使用）
#[derive(Debug, Clone, Serialize)]
pub struct TftpFileInfo {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// 根目录文件管理器
#[derive(Debug, Clone)]
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 建立目录骨架
    pub fn ensure_directories(&self) -> Result<()> {
        let dirs = [
            PathBuf::new(),
            PathBuf::from("pxelinux.cfg"),
            PathBuf::from("static/kernels"),
            PathBuf::from("static/initramfs"),
            PathBuf::from("repos/ubuntu"),
            PathBuf::from("repos/debian"),
            PathBuf::from("repos/centos"),
            PathBuf::from("repos/rocky"),
        ];
        for dir in dirs {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path)
                .map_err(|e| Error::Internal(format!("创建目录 {} 失败: {e}", path.display())))?;
        }
        Ok(())
    }

    /// 把客户端请求的路径解析为根目录下的绝对路径
    ///
    /// 拒绝绝对路径与任何包含 `..` 的路径
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        let requested = requested.trim_start_matches('/');
        let rel = Path::new(requested);
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "非法 TFTP 路径: {requested}"
                    )))
                }
            }
        }
        Ok(self.root.join(rel))
    }

    /// 写入文件（必要时创建父目录）
    pub fn write_file(&self, relative: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("创建目录失败: {e}")))?;
        }
        std::fs::write(&path, content)
            .map_err(|e| Error::Internal(format!("写入 {} 失败: {e}", path.display())))?;
        Ok(())
    }

    /// 递归列出根目录下所有文件
    pub fn list_files(&self) -> Result<Vec<TftpFileInfo>> {
        let mut files = Vec::new();
        self.walk(&self.root, Path::new(""), &mut files)?;
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn walk(&self, dir: &Path, prefix: &Path, out: &mut Vec<TftpFileInfo>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::Internal(format!("读取目录 {} 失败: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Internal(e.to_string()))?;
            let name = entry.file_name();
            let rel = prefix.join(&name);
            let meta = entry.metadata().map_err(|e| Error::Internal(e.to_string()))?;
            if meta.is_dir() {
                self.walk(&entry.path(), &rel, out)?;
            } else {
                let modified: DateTime<Utc> = meta
                    .modified()
                    .map(DateTime::from)
                    .unwrap_or_else(|_| Utc::now());
                out.push(TftpFileInfo {
                    name: rel.to_string_lossy().to_string(),
                    size: meta.len(),
                    modified,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let fm = FileManager::new(tmp.path());
        assert!(fm.resolve("../etc/passwd").is_err());
        assert!(fm.resolve("kernels/../../etc/passwd").is_err());
        assert!(fm.resolve("pxelinux.cfg/default").is_ok());
        assert!(fm.resolve("/pxelinux.cfg/default").is_ok());
    }

    #[test]
    fn test_ensure_directories_and_list() {
        let tmp = TempDir::new().unwrap();
        let fm = FileManager::new(tmp.path());
        fm.ensure_directories().unwrap();
        fm.write_file("pxelinux.cfg/default", b"DEFAULT local\n").unwrap();
        fm.write_file("static/kernels/vmlinuz-ubuntu-22.04", b"fake kernel").unwrap();

        let files = fm.list_files().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"pxelinux.cfg/default"));
        assert!(names.contains(&"static/kernels/vmlinuz-ubuntu-22.04"));
        let default = files.iter().find(|f| f.name == "pxelinux.cfg/default").unwrap();
        assert_eq!(default.size, 14);
    }
}
