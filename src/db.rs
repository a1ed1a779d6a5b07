use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::pipeline::lesson::LessonRow;

/// Sections per page share an id block: `page_id * 10000 + section_serial_id`.
const SECTION_ID_STRIDE: i64 = 10_000;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS lesson_pages (
            page_id      INTEGER PRIMARY KEY,
            page_title   TEXT,
            topic        TEXT,
            key_words    TEXT,
            page_content TEXT NOT NULL DEFAULT '[]',
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS lesson_steps (
            id            INTEGER PRIMARY KEY,
            run_id        TEXT NOT NULL,
            lesson_id     INTEGER NOT NULL,
            lesson_title  TEXT NOT NULL,
            section_id    INTEGER NOT NULL,
            section_style TEXT NOT NULL CHECK(section_style IN
                ('Definition','Mechanism','Procedure','Comparison','Example')),
            content       TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_steps_lesson ON lesson_steps(lesson_id, section_id);
        CREATE INDEX IF NOT EXISTS idx_steps_run ON lesson_steps(run_id);
        ",
    )?;
    Ok(())
}

// ── Sections ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSection {
    pub section_id: i64,
    pub page_id: i64,
    pub page_title: Option<String>,
    pub title: Option<String>,
    pub text: String,
    pub topic: Option<String>,
    pub keywords: Vec<String>,
    pub status: String,
}

/// Flatten the first `limit` pages (by `page_id`) into one section per
/// `page_content` entry.
pub fn fetch_sections(conn: &Connection, limit: Option<usize>) -> Result<Vec<RawSection>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT page_id, page_title, topic, key_words, page_content
             FROM lesson_pages ORDER BY page_id LIMIT {}",
            n
        ),
        None => "SELECT page_id, page_title, topic, key_words, page_content
                 FROM lesson_pages ORDER BY page_id"
            .to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let pages = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for (page_id, page_title, page_topic, page_keywords, content) in pages {
        let page_keywords = parse_keywords(page_keywords.as_deref());
        let entries = match content.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(Value::Array(entries))) => entries,
            Some(Err(e)) => {
                warn!(page_id, error = %e, "unparsable page_content, skipping page");
                continue;
            }
            _ => continue,
        };
        for entry in entries {
            let Value::Object(s) = entry else { continue };
            let section_id = match s.get("section_serial_id").and_then(Value::as_i64) {
                Some(serial) => match section_id_for(page_id, serial) {
                    Some(id) => id,
                    None => {
                        warn!(page_id, serial, "section id out of range, skipping section");
                        continue;
                    }
                },
                None => page_id,
            };
            let section_keywords = match s.get("section_key_words") {
                Some(v) => keywords_from_value(v),
                None => Vec::new(),
            };
            out.push(RawSection {
                section_id,
                page_id,
                page_title: page_title.clone(),
                title: str_field(&s, "section_title"),
                text: str_field(&s, "text").unwrap_or_default(),
                topic: str_field(&s, "topic").or_else(|| page_topic.clone()),
                keywords: if section_keywords.is_empty() {
                    page_keywords.clone()
                } else {
                    section_keywords
                },
                status: "pending".to_string(),
            });
        }
    }
    debug!(sections = out.len(), "flattened pages");
    Ok(out)
}

fn section_id_for(page_id: i64, serial: i64) -> Option<i64> {
    page_id.checked_mul(SECTION_ID_STRIDE)?.checked_add(serial)
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `key_words` is stored either as a JSON array or a comma-separated string.
fn parse_keywords(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Array(_)) => keywords_from_value(&v),
        _ => split_keywords(raw),
    }
}

fn keywords_from_value(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_keywords(s),
        _ => Vec::new(),
    }
}

fn split_keywords(s: &str) -> Vec<String> {
    s.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

// ── Lesson steps ──

pub fn save_lesson_rows(conn: &Connection, run_id: &str, rows: &[LessonRow]) -> Result<usize> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO lesson_steps
                (run_id, lesson_id, lesson_title, section_id, section_style, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                run_id,
                r.lesson_id,
                r.lesson_title,
                r.section_id,
                r.section_style.as_str(),
                r.content,
                now,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub struct Stats {
    pub pages: i64,
    pub steps: i64,
    pub lessons: i64,
    pub runs: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        pages: count("SELECT COUNT(*) FROM lesson_pages")?,
        steps: count("SELECT COUNT(*) FROM lesson_steps")?,
        lessons: count("SELECT COUNT(DISTINCT lesson_id) FROM lesson_steps")?,
        runs: count("SELECT COUNT(DISTINCT run_id) FROM lesson_steps")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InfoType;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn insert_page(conn: &Connection, id: i64, topic: &str, key_words: &str, content: &str) {
        conn.execute(
            "INSERT INTO lesson_pages (page_id, page_title, topic, key_words, page_content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, format!("Page {}", id), topic, key_words, content],
        )
        .unwrap();
    }

    #[test]
    fn sections_are_flattened_with_fallbacks() {
        let conn = memory();
        insert_page(
            &conn,
            3,
            "derivatives",
            r#"["funding", "perpetual"]"#,
            r#"[
                {"section_serial_id": 1, "section_title": "Intro", "text": "A funding rate is a fee."},
                {"section_serial_id": 2, "text": "Longs pay shorts.", "topic": "flows",
                 "section_key_words": ["longs", "shorts"]},
                "not an object",
                {"text": "no serial"}
            ]"#,
        );

        let sections = fetch_sections(&conn, None).unwrap();
        assert_eq!(sections.len(), 3);

        assert_eq!(sections[0].section_id, 30_001);
        assert_eq!(sections[0].title.as_deref(), Some("Intro"));
        assert_eq!(sections[0].topic.as_deref(), Some("derivatives"));
        assert_eq!(sections[0].keywords, vec!["funding", "perpetual"]);
        assert_eq!(sections[0].page_title.as_deref(), Some("Page 3"));
        assert_eq!(sections[0].status, "pending");

        assert_eq!(sections[1].section_id, 30_002);
        assert_eq!(sections[1].topic.as_deref(), Some("flows"));
        assert_eq!(sections[1].keywords, vec!["longs", "shorts"]);

        assert_eq!(sections[2].section_id, 3);
        assert_eq!(sections[2].title, None);
    }

    #[test]
    fn limit_counts_pages_in_id_order() {
        let conn = memory();
        let one = r#"[{"section_serial_id": 1, "text": "x"}, {"section_serial_id": 2, "text": "y"}]"#;
        insert_page(&conn, 9, "t", "", one);
        insert_page(&conn, 2, "t", "", one);
        let sections = fetch_sections(&conn, Some(1)).unwrap();
        let ids: Vec<_> = sections.iter().map(|s| s.section_id).collect();
        assert_eq!(ids, vec![20_001, 20_002]);
    }

    #[test]
    fn out_of_range_section_ids_are_skipped() {
        let conn = memory();
        let huge = i64::MAX / 100;
        insert_page(
            &conn,
            huge,
            "t",
            "",
            r#"[{"section_serial_id": 1, "text": "overflows"}, {"text": "page-level"}]"#,
        );
        insert_page(
            &conn,
            i64::MAX / SECTION_ID_STRIDE,
            "t",
            "",
            &format!(r#"[{{"section_serial_id": {}, "text": "edge"}}]"#, i64::MAX),
        );
        insert_page(&conn, 4, "t", "", r#"[{"section_serial_id": 2, "text": "fine"}]"#);

        let sections = fetch_sections(&conn, None).unwrap();
        let got: Vec<_> = sections.iter().map(|s| (s.section_id, s.text.as_str())).collect();
        assert_eq!(got, vec![(40_002, "fine"), (huge, "page-level")]);
    }

    #[test]
    fn bad_content_yields_no_sections() {
        let conn = memory();
        insert_page(&conn, 1, "t", "", "{not json");
        insert_page(&conn, 2, "t", "", r#"{"text": "object, not list"}"#);
        assert!(fetch_sections(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn keyword_formats() {
        assert_eq!(parse_keywords(Some("funding, mark price ,")), vec!["funding", "mark price"]);
        assert_eq!(parse_keywords(Some(r#"["a", " b "]"#)), vec!["a", "b"]);
        assert!(parse_keywords(Some("  ")).is_empty());
        assert!(parse_keywords(None).is_empty());
    }

    #[test]
    fn lesson_rows_round_trip_through_stats() {
        let conn = memory();
        let rows = vec![
            LessonRow {
                lesson_id: 1,
                lesson_title: "Funding".into(),
                section_id: 1,
                section_style: InfoType::Definition,
                content: "a funding rate is a fee.".into(),
            },
            LessonRow {
                lesson_id: 1,
                lesson_title: "Funding".into(),
                section_id: 2,
                section_style: InfoType::Procedure,
                content: "first, check the rate.".into(),
            },
        ];
        assert_eq!(save_lesson_rows(&conn, "run-a", &rows).unwrap(), 2);
        assert_eq!(save_lesson_rows(&conn, "run-b", &rows[..1]).unwrap(), 1);

        let style: String = conn
            .query_row(
                "SELECT section_style FROM lesson_steps WHERE run_id = 'run-a' AND section_id = 2",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(style, "Procedure");

        let s = get_stats(&conn).unwrap();
        assert_eq!((s.pages, s.steps, s.lessons, s.runs), (0, 3, 1, 2));
    }
}
