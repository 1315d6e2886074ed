//! 统计结果输出.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use lung_berry::host::ReportSink;
use lung_berry::stats::{Burden, ClinicalSummary, ReportRow, ReportSchema, Statistics};
use utils::{HostError, HostResult};

/// 将报告写为 `{dir}/{case}.csv`. 每个病例开始前需调用 [`CsvSink::begin`].
#[derive(Debug)]
pub struct CsvSink {
    dir: PathBuf,
    case: Option<String>,
}

impl CsvSink {
    /// 以 `dir` 为输出目录.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
            case: None,
        }
    }

    /// 设定接下来报告所属的病例.
    pub fn begin(&mut self, case: &str) {
        self.case = Some(case.to_string());
    }
}

/// 将 `stats` 按 `schema` 写为 csv.
fn write_csv<W: Write>(schema: &ReportSchema, stats: &Statistics, w: &mut W) -> io::Result<()> {
    writeln!(w, "{}", schema.columns().join(","))?;
    for r in stats.rows() {
        writeln!(w, "{}", schema.render(&ReportRow::from(r)).join(","))?;
    }
    Ok(())
}

impl ReportSink for CsvSink {
    type Error = HostError;

    fn receive(&mut self, schema: &ReportSchema, stats: &Statistics) -> HostResult<()> {
        let case = self.case.take().unwrap_or_else(|| "report".to_string());
        let path = self.dir.join(format!("{case}.csv"));
        let mut buf = Vec::with_capacity(4096);
        write_csv(schema, stats, &mut buf)?;
        fs::write(&path, buf)?;
        info!("report {schema} written to {}", path.display());
        Ok(())
    }
}

/// 将一侧的汇总写进 `w` 中.
fn describe_into<W: Write>(name: &str, b: &Burden, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn ratio_to_display(f: f64) -> String {
        if f < 0.0 {
            "/".to_string()
        } else {
            format!("{f:.2}")
        }
    }

    writeln!(w, "{S4}{name}:")?;
    writeln!(w, "{S4}{S4}Total volume: {:.0} ml", b.total_ml)?;
    writeln!(
        w,
        "{S4}{S4}Functional volume: {:.0} ml ({:.1}%)",
        b.functional_ml, b.functional_percent
    )?;
    writeln!(
        w,
        "{S4}{S4}Affected volume: {:.0} ml ({:.1}%)",
        b.affected_ml, b.affected_percent
    )?;
    write!(
        w,
        "{S4}{S4}Affected fraction: {}, affected / functional: {}",
        ratio_to_display(b.affected_fraction),
        ratio_to_display(b.affected_to_functional)
    )?;
    Ok(())
}

/// 全部病例的运行结果.
pub struct RunResult {
    data: Vec<(String, HostResult<ClinicalSummary>)>,
}

impl RunResult {
    /// 由 `(病例, 结果)` 构造.
    pub fn from_iter<I: IntoIterator<Item = (String, HostResult<ClinicalSummary>)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 失败的病例数.
    pub fn failures(&self) -> usize {
        self.data.iter().filter(|(_, r)| r.is_err()).count()
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        utils::sep_to(&mut out)?;
        for (case, r) in self.data.iter() {
            match r {
                Ok(s) => {
                    writeln!(out, "Case `{case}` ({:?} policy):", s.policy)?;
                    describe_into("right lung", &s.right, &mut out)?;
                    writeln!(out)?;
                    describe_into("left lung", &s.left, &mut out)?;
                    writeln!(out)?;
                    describe_into("both lungs", &s.total, &mut out)?;
                    writeln!(out)?;
                }
                Err(e) => writeln!(out, "Case `{case}` failed: {e}")?,
            }
            utils::sep_to(&mut out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lung_berry::anatomy::Side;
    use lung_berry::band::{encode, BandTable};
    use lung_berry::stats::{aggregate, BullaPolicy};
    use lung_berry::{GridGeometry, LabelGrid};

    fn stats() -> Statistics {
        let g = GridGeometry::new((1, 2, 2), [10.0; 3]).unwrap();
        let mut labels = LabelGrid::background(g);
        labels.insert_name(encode(Side::Right, 1), "Ventilated right");
        labels.insert_name(encode(Side::Left, 0), "Emphysema left");
        labels[(0, 0, 0)] = encode(Side::Right, 1);
        labels[(0, 0, 1)] = encode(Side::Right, 1);
        labels[(0, 1, 1)] = encode(Side::Left, 0);
        let bands = BandTable::default();
        aggregate(&labels, 1.0, &bands, None, BullaPolicy::Functional).unwrap()
    }

    #[test]
    fn test_write_csv() {
        let mut buf = Vec::new();
        write_csv(&ReportSchema::V1, &stats(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "segment,min_threshold,max_threshold,volume_ml,volume_percent"
        );
        assert!(lines.contains(&"Ventilated right,-950,-775,2,100.0"));
        assert!(lines.contains(&"Emphysema right,-1050,-950,0,0.0"));
        assert!(lines.contains(&"total,,,3,100.0"));
    }

    #[test]
    fn test_csv_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path());
        sink.begin("c1");
        sink.receive(&ReportSchema::V1, &stats()).unwrap();
        let text = fs::read_to_string(dir.path().join("c1.csv")).unwrap();
        assert!(text.starts_with("segment,"));
    }
}
