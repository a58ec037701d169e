//! Approve CLI command.

use super::output_error;
use crate::models::DecisionTable;
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;

/// Records approval of decision table rows.
///
/// Either every named row is approved or the table is left untouched.
#[derive(Debug, Clone)]
pub struct ApproveCommand {
    /// Decision table file.
    pub table: PathBuf,
    /// Row identifiers to approve.
    pub rows: Vec<String>,
    /// Who is approving; defaults to `$USER`.
    pub by: Option<String>,
}

impl ApproveCommand {
    /// Approves the rows and saves the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or written, or a row does not exist.
    pub fn run(&self, out: &mut impl Write) -> Result<DecisionTable> {
        if self.rows.is_empty() {
            return Err(Error::InvalidInput("no rows to approve".to_string()));
        }
        let mut table = DecisionTable::load(&self.table)?;
        if let Some(missing) = self.rows.iter().find(|id| table.row(id).is_none()) {
            return Err(Error::InvalidInput(format!("unknown decision row: {missing}")));
        }

        let approver = self.approver();
        for row_id in &self.rows {
            let row = table.approve(row_id, &approver)?;
            writeln!(
                out,
                "Approved {}: {} ({})",
                row.row_id,
                row.verdict.kind,
                row.verdict.confidence.as_str()
            )
            .map_err(output_error)?;
        }
        table.save(&self.table)?;
        Ok(table)
    }

    fn approver(&self) -> String {
        self.by
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterId, Confidence, DecisionRow, UnitId, Verdict, VerdictKind};
    use tempfile::TempDir;

    fn saved_table(dir: &TempDir) -> PathBuf {
        let verdict = Verdict::new(
            UnitId::new("a"),
            UnitId::new("b"),
            VerdictKind::Merge,
            Confidence::High,
            "same job",
        );
        let cluster = ClusterId::new("c-1");
        let mut table = DecisionTable::new();
        table.rows.push(DecisionRow {
            row_id: DecisionRow::make_id(&cluster, &verdict.units),
            cluster_id: cluster,
            verdict,
            approval: None,
        });
        let path = dir.path().join("table.json");
        table.save(&path).unwrap();
        path
    }

    #[test]
    fn test_approve_persists() {
        let dir = TempDir::new().unwrap();
        let path = saved_table(&dir);
        let command = ApproveCommand {
            table: path.clone(),
            rows: vec!["c-1/a+b".to_string()],
            by: Some("reviewer".to_string()),
        };
        let mut out = Vec::new();
        command.run(&mut out).unwrap();

        let table = DecisionTable::load(&path).unwrap();
        let approval = table.rows[0].approval.as_ref().unwrap();
        assert_eq!(approval.approved_by, "reviewer");
        assert!(String::from_utf8(out).unwrap().contains("Approved c-1/a+b: MERGE"));
    }

    #[test]
    fn test_unknown_row_leaves_table_untouched() {
        let dir = TempDir::new().unwrap();
        let path = saved_table(&dir);
        let before = std::fs::read(&path).unwrap();
        let command = ApproveCommand {
            table: path.clone(),
            rows: vec!["c-1/a+b".to_string(), "c-9/x+y".to_string()],
            by: None,
        };
        let mut out = Vec::new();
        assert!(command.run(&mut out).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
