//! 种子点文件.
//!
//! 每个病例一个 json 文件 `{case}.seeds.json`, 内容为种子集合数组. 坐标为物理坐标
//! (毫米, RAS), 区域名为 `RightLung`, `LeftLung` 或 `Airway`.
//!
//! ```json
//! [
//!     { "region": "RightLung", "points": [[-80.5, 12.0, -140.0]] },
//!     { "region": "LeftLung", "points": [[95.0, 10.5, -138.0]] },
//!     { "region": "Airway", "points": [[5.0, 20.0, -60.0]] }
//! ]
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use lung_berry::grow::SeedSet;
use lung_berry::host::SeedSource;

use crate::{HostError, HostResult};

/// 种子点文件的扩展名.
pub const SEED_EXTENSION: &str = "seeds.json";

/// 解析种子点 json 文本.
pub fn parse_seeds(text: &str) -> HostResult<Vec<SeedSet>> {
    Ok(serde_json::from_str(text)?)
}

/// 从目录中按 `{case}.seeds.json` 读取种子点.
#[derive(Clone, Debug)]
pub struct SeedDir {
    dir: PathBuf,
}

impl SeedDir {
    /// 以 `dir` 为种子点文件目录.
    #[inline]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }
}

impl SeedSource for SeedDir {
    type Error = HostError;

    fn seed_sets(&mut self, case: &str) -> HostResult<Vec<SeedSet>> {
        let id = format!("{case}.{SEED_EXTENSION}");
        let path = self.dir.join(&id);
        if !path.is_file() {
            return Err(HostError::NotFound {
                id,
                dir: self.dir.clone(),
            });
        }
        let sets: Vec<SeedSet> = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        debug!("{}: {} seed sets", path.display(), sets.len());
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lung_berry::anatomy::Region;
    use std::fs;

    #[test]
    fn test_parse_seeds() {
        let text = r#"[
            { "region": "RightLung", "points": [[-80.5, 12, -140], [-70, 12, -150]] },
            { "region": "LeftLung", "points": [[95, 10.5, -138]] },
            { "region": "Airway", "points": [[5, 20, -60]] }
        ]"#;
        let sets = parse_seeds(text).unwrap();
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].region(), Region::RightLung);
        assert_eq!(
            sets[0].points(),
            &[[-80.5, 12.0, -140.0], [-70.0, 12.0, -150.0]]
        );
        assert_eq!(sets[1].region(), Region::LeftLung);
        assert_eq!(sets[2].region(), Region::Airway);
    }

    #[test]
    fn test_parse_seeds_errors() {
        let e = parse_seeds(r#"[{ "region": "RightLung", "points": [[1, 2]] }]"#).unwrap_err();
        assert!(matches!(e, HostError::Json(_)));

        let e = parse_seeds(r#"[{ "region": "Liver", "points": [] }]"#).unwrap_err();
        assert!(e.to_string().contains("Liver"));

        let e = parse_seeds("right lung 1 2 3").unwrap_err();
        assert!(matches!(e, HostError::Json(_)));
    }

    #[test]
    fn test_seed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[0.0; 3]]),
            SeedSet::new(Region::LeftLung, vec![[1.0; 3]]),
        ];
        let text = serde_json::to_string(&sets).unwrap();
        fs::write(dir.path().join("c1.seeds.json"), text).unwrap();

        let mut src = SeedDir::new(dir.path());
        assert_eq!(src.seed_sets("c1").unwrap(), sets);
        assert!(matches!(
            src.seed_sets("c2"),
            Err(HostError::NotFound { .. })
        ));
    }
}
