//! SQLite persistence for research cases and generated reports.
//!
//! Uses `rusqlite` in synchronous mode with WAL enabled. Every mutation bumps
//! a single `last_updated` timestamp. The whole store can be exported to one
//! JSON document and imported back verbatim.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::errors::ResearchError;
use super::orchestrator::PipelineState;
use super::types::ResearchMode;

// ─── Types ──────────────────────────────────────────────────────────────────

/// A new case, before the store assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub name: String,
    pub genotype_id: Option<u8>,
    pub notes: Option<String>,
}

/// A stored case (one person or scenario that reports are filed under).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRecord {
    pub id: String,
    pub name: String,
    pub genotype_id: Option<u8>,
    pub notes: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp; bumped when a report is filed under the case.
    pub updated_at: String,
}

/// A finished pipeline run, ready to be recorded.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub case_id: Option<String>,
    pub query: String,
    pub research_mode: ResearchMode,
    pub genotype_id: Option<u8>,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub evidence_level: Option<String>,
    /// Failure reason; `None` for a completed run.
    pub error: Option<String>,
}

impl NewReport {
    /// Build a report from a terminal pipeline state. Returns `None` for
    /// non-terminal states.
    pub fn from_state(
        query: &str,
        research_mode: ResearchMode,
        genotype_id: Option<u8>,
        case_id: Option<String>,
        state: &PipelineState,
    ) -> Option<Self> {
        let (summary, recommendations, evidence_level, error) = match state {
            PipelineState::Done { synthesis, .. } => (
                synthesis.summary_text.clone(),
                synthesis.recommendations.clone(),
                Some(synthesis.evidence_level.clone()),
                None,
            ),
            PipelineState::Failed { reason, .. } => {
                (String::new(), Vec::new(), None, Some(reason.clone()))
            }
            _ => return None,
        };
        Some(Self {
            case_id,
            query: query.to_string(),
            research_mode,
            genotype_id,
            summary,
            recommendations,
            evidence_level,
            error,
        })
    }
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub case_id: Option<String>,
    pub query: String,
    pub research_mode: ResearchMode,
    pub genotype_id: Option<u8>,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub evidence_level: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

impl ReportRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Export/import document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    pub cases: Vec<CaseRecord>,
    pub reports: Vec<ReportRecord>,
    pub last_updated: Option<String>,
}

// ─── Database ───────────────────────────────────────────────────────────────

const LAST_UPDATED_KEY: &str = "last_updated";

/// SQLite handle for research history.
pub struct ResearchHistory {
    conn: Connection,
}

impl ResearchHistory {
    /// Open (or create) the history database at the given path.
    ///
    /// Pass `":memory:"` for an in-memory database (tests).
    pub fn open(path: &str) -> Result<Self, ResearchError> {
        let conn = Connection::open(path)?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<(), ResearchError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cases (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                genotype_id INTEGER,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                case_id TEXT,
                query TEXT NOT NULL,
                research_mode TEXT NOT NULL,
                genotype_id INTEGER,
                summary TEXT NOT NULL DEFAULT '',
                recommendations TEXT NOT NULL DEFAULT '[]',
                evidence_level TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (case_id) REFERENCES cases(id)
            );

            CREATE INDEX IF NOT EXISTS idx_reports_case
                ON reports(case_id, created_at);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ─── Cases ──────────────────────────────────────────────────────────

    pub fn save_case(&self, case: NewCase) -> Result<CaseRecord, ResearchError> {
        let now = timestamp();
        let record = CaseRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: case.name,
            genotype_id: case.genotype_id,
            notes: case.notes,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        self.insert_case(&record)?;
        self.touch(&now)?;
        tracing::info!(case_id = %record.id, "case saved");
        Ok(record)
    }

    fn insert_case(&self, case: &CaseRecord) -> Result<(), ResearchError> {
        self.conn.execute(
            "INSERT INTO cases (id, name, genotype_id, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                case.id,
                case.name,
                case.genotype_id,
                case.notes,
                case.created_at,
                case.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>, ResearchError> {
        let result = self
            .conn
            .query_row(
                "SELECT id, name, genotype_id, notes, created_at, updated_at
                 FROM cases WHERE id = ?1",
                params![case_id],
                case_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// All cases, most recently updated first.
    pub fn list_cases(&self) -> Result<Vec<CaseRecord>, ResearchError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, genotype_id, notes, created_at, updated_at
             FROM cases
             ORDER BY updated_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], case_from_row)?;

        let mut cases = Vec::new();
        for row in rows {
            cases.push(row?);
        }
        Ok(cases)
    }

    /// Delete a case and every report filed under it.
    pub fn delete_case(&self, case_id: &str) -> Result<(), ResearchError> {
        self.conn
            .execute("DELETE FROM reports WHERE case_id = ?1", params![case_id])?;
        let removed = self
            .conn
            .execute("DELETE FROM cases WHERE id = ?1", params![case_id])?;
        if removed == 0 {
            return Err(ResearchError::CaseNotFound {
                case_id: case_id.to_string(),
            });
        }
        self.touch(&timestamp())?;
        Ok(())
    }

    // ─── Reports ────────────────────────────────────────────────────────

    /// Record a finished run. A referenced case must exist.
    pub fn record_report(&self, report: NewReport) -> Result<ReportRecord, ResearchError> {
        let now = timestamp();
        if let Some(case_id) = report.case_id.as_deref() {
            let updated = self.conn.execute(
                "UPDATE cases SET updated_at = ?2 WHERE id = ?1",
                params![case_id, now],
            )?;
            if updated == 0 {
                return Err(ResearchError::CaseNotFound {
                    case_id: case_id.to_string(),
                });
            }
        }

        let record = ReportRecord {
            id: uuid::Uuid::new_v4().to_string(),
            case_id: report.case_id,
            query: report.query,
            research_mode: report.research_mode,
            genotype_id: report.genotype_id,
            summary: report.summary,
            recommendations: report.recommendations,
            evidence_level: report.evidence_level,
            error: report.error,
            created_at: now.clone(),
        };
        self.insert_report(&record)?;
        self.touch(&now)?;
        tracing::info!(
            report_id = %record.id,
            succeeded = record.succeeded(),
            "report recorded"
        );
        Ok(record)
    }

    fn insert_report(&self, report: &ReportRecord) -> Result<(), ResearchError> {
        let recommendations_json = serde_json::to_string(&report.recommendations)?;
        self.conn.execute(
            "INSERT INTO reports
             (id, case_id, query, research_mode, genotype_id, summary, recommendations,
              evidence_level, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                report.id,
                report.case_id,
                report.query,
                report.research_mode.as_str(),
                report.genotype_id,
                report.summary,
                recommendations_json,
                report.evidence_level,
                report.error,
                report.created_at,
            ],
        )?;
        Ok(())
    }

    /// Reports, newest first; optionally only those filed under one case.
    pub fn list_reports(&self, case_id: Option<&str>) -> Result<Vec<ReportRecord>, ResearchError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, query, research_mode, genotype_id, summary, recommendations,
                    evidence_level, error, created_at
             FROM reports
             WHERE ?1 IS NULL OR case_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![case_id], report_from_row)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    // ─── Metadata / Import / Export ─────────────────────────────────────

    /// Timestamp of the most recent mutation, if any.
    pub fn last_updated(&self) -> Result<Option<String>, ResearchError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![LAST_UPDATED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn touch(&self, at: &str) -> Result<(), ResearchError> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_UPDATED_KEY, at],
        )?;
        Ok(())
    }

    pub fn export(&self) -> Result<HistoryExport, ResearchError> {
        let mut cases = self.list_cases()?;
        cases.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut reports = self.list_reports(None)?;
        reports.reverse();
        Ok(HistoryExport {
            cases,
            reports,
            last_updated: self.last_updated()?,
        })
    }

    /// The whole store as one JSON document.
    pub fn export_json(&self) -> Result<String, ResearchError> {
        Ok(serde_json::to_string_pretty(&self.export()?)?)
    }

    /// Replace the stored collections with an exported document, verbatim.
    ///
    /// Runs in one transaction; a malformed document leaves the store
    /// untouched.
    pub fn import_json(&self, json: &str) -> Result<(), ResearchError> {
        let doc: HistoryExport = serde_json::from_str(json)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch("DELETE FROM reports; DELETE FROM cases; DELETE FROM meta;")?;
        for case in &doc.cases {
            self.insert_case(case)?;
        }
        for report in &doc.reports {
            self.insert_report(report)?;
        }
        if let Some(at) = doc.last_updated.as_deref() {
            self.touch(at)?;
        }
        tx.commit()?;

        tracing::info!(
            cases = doc.cases.len(),
            reports = doc.reports.len(),
            "history imported"
        );
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<CaseRecord> {
    Ok(CaseRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        genotype_id: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRecord> {
    Ok(ReportRecord {
        id: row.get(0)?,
        case_id: row.get(1)?,
        query: row.get(2)?,
        research_mode: parse_mode(&row.get::<_, String>(3)?),
        genotype_id: row.get(4)?,
        summary: row.get(5)?,
        recommendations: parse_json_array(row.get::<_, String>(6)?),
        evidence_level: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn parse_mode(s: &str) -> ResearchMode {
    match s {
        "breadth-first" => ResearchMode::BreadthFirst,
        _ => ResearchMode::DepthFirst,
    }
}

fn parse_json_array(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::orchestrator::PipelineStage;
    use crate::research::types::{ResearchPlan, ResearchSynthesis};

    fn test_db() -> ResearchHistory {
        ResearchHistory::open(":memory:").unwrap()
    }

    fn new_case(name: &str) -> NewCase {
        NewCase {
            name: name.to_string(),
            genotype_id: Some(2),
            notes: None,
        }
    }

    fn report_for(case_id: Option<String>, query: &str) -> NewReport {
        NewReport {
            case_id,
            query: query.to_string(),
            research_mode: ResearchMode::BreadthFirst,
            genotype_id: None,
            summary: "resumen".into(),
            recommendations: vec!["r1".into(), "r2".into()],
            evidence_level: Some("Moderada".into()),
            error: None,
        }
    }

    #[test]
    fn save_and_get_case() {
        let db = test_db();
        assert!(db.last_updated().unwrap().is_none());

        let saved = db.save_case(new_case("Ana")).unwrap();
        let fetched = db.get_case(&saved.id).unwrap().unwrap();
        assert_eq!(fetched, saved);
        assert_eq!(fetched.genotype_id, Some(2));
        assert!(db.last_updated().unwrap().is_some());
        assert!(db.get_case("missing").unwrap().is_none());
    }

    #[test]
    fn reports_filter_by_case() {
        let db = test_db();
        let case = db.save_case(new_case("Ana")).unwrap();
        db.record_report(report_for(Some(case.id.clone()), "q1")).unwrap();
        db.record_report(report_for(None, "q2")).unwrap();

        let all = db.list_reports(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].query, "q2");

        let for_case = db.list_reports(Some(&case.id)).unwrap();
        assert_eq!(for_case.len(), 1);
        assert_eq!(for_case[0].recommendations, vec!["r1", "r2"]);
        assert_eq!(for_case[0].research_mode, ResearchMode::BreadthFirst);
    }

    #[test]
    fn report_for_unknown_case_is_rejected() {
        let db = test_db();
        let err = db
            .record_report(report_for(Some("nope".into()), "q"))
            .unwrap_err();
        assert!(matches!(err, ResearchError::CaseNotFound { .. }));
        assert!(db.list_reports(None).unwrap().is_empty());
    }

    #[test]
    fn delete_case_removes_its_reports() {
        let db = test_db();
        let case = db.save_case(new_case("Ana")).unwrap();
        db.record_report(report_for(Some(case.id.clone()), "q1")).unwrap();
        db.record_report(report_for(None, "q2")).unwrap();

        db.delete_case(&case.id).unwrap();
        assert!(db.list_cases().unwrap().is_empty());
        let remaining = db.list_reports(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].query, "q2");

        assert!(matches!(
            db.delete_case(&case.id),
            Err(ResearchError::CaseNotFound { .. })
        ));
    }

    #[test]
    fn export_import_round_trips_verbatim() {
        let source = test_db();
        let case = source.save_case(new_case("Ana")).unwrap();
        source
            .record_report(report_for(Some(case.id.clone()), "q1"))
            .unwrap();
        let exported = source.export_json().unwrap();

        let target = test_db();
        target.save_case(new_case("to be replaced")).unwrap();
        target.import_json(&exported).unwrap();

        assert_eq!(target.export().unwrap(), source.export().unwrap());
        assert_eq!(target.last_updated().unwrap(), source.last_updated().unwrap());
    }

    #[test]
    fn malformed_import_leaves_store_untouched() {
        let db = test_db();
        db.save_case(new_case("Ana")).unwrap();
        assert!(db.import_json("{ not json").is_err());
        assert_eq!(db.list_cases().unwrap().len(), 1);
    }

    #[test]
    fn history_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path = path.to_str().unwrap();

        let case_id = {
            let db = ResearchHistory::open(path).unwrap();
            db.save_case(new_case("Ana")).unwrap().id
        };
        let db = ResearchHistory::open(path).unwrap();
        assert_eq!(db.get_case(&case_id).unwrap().unwrap().name, "Ana");
    }

    #[test]
    fn new_report_from_terminal_states_only() {
        let plan = ResearchPlan {
            subagents: vec!["Genética".into()],
            research_mode: ResearchMode::DepthFirst,
        };
        let done = PipelineState::Done {
            plan: plan.clone(),
            results: Vec::new(),
            synthesis: ResearchSynthesis {
                summary_text: "s".into(),
                recommendations: vec!["r".into()],
                evidence_level: "Alta".into(),
            },
        };
        let report = NewReport::from_state("q", ResearchMode::DepthFirst, None, None, &done).unwrap();
        assert!(report.error.is_none());
        assert_eq!(report.evidence_level.as_deref(), Some("Alta"));

        let failed = PipelineState::Failed {
            stage: PipelineStage::Synthesis,
            reason: "no valid results to synthesize".into(),
            results: Vec::new(),
        };
        let report = NewReport::from_state("q", ResearchMode::DepthFirst, None, None, &failed).unwrap();
        assert_eq!(report.error.as_deref(), Some("no valid results to synthesize"));

        let analyzing = PipelineState::Analyzing { plan };
        assert!(NewReport::from_state("q", ResearchMode::DepthFirst, None, None, &analyzing).is_none());
    }
}
