//! 命令行宿主依赖的通用组件: nifti 读写, 种子点文件解析, 数据目录与核心数.

use std::env;
use std::path::PathBuf;

pub mod loader;
pub mod seeds;

mod error;

pub use error::{HostError, HostResult};

const SEP: &str = "--------------------------------------------------------";

/// 向 `w` 写入一条分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 获取数据根目录.
///
/// 1. 若环境变量 `$LUNG_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/lung`.
pub fn data_dir_from_env_or_home() -> HostResult<PathBuf> {
    match env::var("LUNG_DATA_DIR") {
        Ok(d) if !d.is_empty() => Ok(PathBuf::from(d)),
        _ => home_dataset_dir_with(["dataset", "lung"]),
    }
}

/// 在用户主目录后依次拼接 `components`.
pub fn home_dataset_dir_with<I, S>(components: I) -> HostResult<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::path::Path>,
{
    let mut p = dirs::home_dir().ok_or(HostError::NoHomeDir)?;
    p.extend(components);
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_dataset_dir_with() {
        if let Some(home) = dirs::home_dir() {
            let p = home_dataset_dir_with(["dataset", "lung"]).unwrap();
            assert_eq!(p, home.join("dataset").join("lung"));
        }
    }

    #[test]
    fn test_sep_to() {
        let mut buf = Vec::new();
        sep_to(&mut buf).unwrap();
        assert_eq!(buf, format!("{SEP}\n").into_bytes());
    }

    #[test]
    fn test_cpus() {
        assert!(cpus() >= 1);
    }
}
