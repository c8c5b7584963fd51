use crate::models::ResultRow;
use chrono::Utc;
use log::warn;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const CSV_HEADER: [&str; 11] = [
    "ambito",
    "ambito_id",
    "provincia",
    "categoria",
    "puesto",
    "agrupacion_id",
    "agrupacion",
    "votos_pct",
    "mesas_pct",
    "foto",
    "ts_iso",
];

/// UTC timestamp at second precision with a trailing Z, shared by every row
/// of one cycle.
pub fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Serialize to a sibling temp file, then rename over the target. The
/// broadcast tool reads this file on its own schedule and must never see a
/// half-written snapshot.
pub fn write_csv_atomic(rows: &[ResultRow], path: &Path) -> Result<(), csv::Error> {
    let tmp = path.with_extension("tmp");
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)?;
        wtr.write_record(CSV_HEADER)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Per-cycle diagnostics: errors and warnings collected while the cycle runs,
/// appended as one block to logs/run.log afterwards.
pub struct CycleLog {
    pub ts_iso: String,
    pub ambitos_ok: u32,
    pub errors: Vec<String>,
}

impl CycleLog {
    pub fn new(ts_iso: &str) -> Self {
        Self {
            ts_iso: ts_iso.to_string(),
            ambitos_ok: 0,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, msg: String) {
        warn!("{msg}");
        self.errors.push(msg);
    }

    pub fn append_to(&self, logs_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(logs_dir)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(logs_dir.join("run.log"))?;
        writeln!(
            f,
            "[{}] ambitos_ok={} errores={}",
            self.ts_iso,
            self.ambitos_ok,
            self.errors.len()
        )?;
        for e in &self.errors {
            writeln!(f, "- {e}")?;
        }
        writeln!(f)?;
        Ok(())
    }
}

/// One-time dump of the categories payload, kept for the operators.
pub fn dump_categorias(raw_json: &str, logs_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(logs_dir)?;
    let pretty = serde_json::from_str::<serde_json::Value>(raw_json)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| raw_json.to_string());
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("categorias.log"))?;
    writeln!(f, "[{}] categorias", now_iso())?;
    writeln!(f, "{pretty}")?;
    writeln!(f)?;
    Ok(())
}
