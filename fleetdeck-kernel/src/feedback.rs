/**
 * FEEDBACK LOG - Jeu de feedback utilisateur et suggestions par service
 *
 * RÔLE :
 * Stocke les messages utilisateurs (initial), leur intention normalisée
 * (tokenized) et la qualité perçue (userfeedback). Alimente la table de
 * feedback et les suggestions du dashboard. Le registre ne le modifie jamais.
 *
 * FONCTIONNEMENT :
 * - Cache mémoire, fichier JSON optionnel réécrit (tmp + rename) à chaque ajout
 * - Fichier illisible au démarrage => erreur, jamais écrasé
 * - Lecture paginée, plus récents d'abord
 * - Suggestions = labels tokenized d'un service, plus récents d'abord
 */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::models::FeedbackRecord;
use crate::registry::RegistryError;
use crate::store::file::write_atomically;

pub const DEFAULT_PAGE_LIMIT: usize = 10;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;
pub const MAX_SUGGESTION_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFeedback {
    pub initial: String,
    pub tokenized: String,
    pub userfeedback: String,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_entries: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackPage {
    pub count: usize,
    pub pagination: Pagination,
    pub data: Vec<FeedbackRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

fn unavailable(e: impl std::fmt::Display) -> RegistryError {
    RegistryError::StoreUnavailable(format!("feedback log: {e}"))
}

pub struct FeedbackLog {
    storage_path: Option<PathBuf>,
    records: Mutex<Vec<FeedbackRecord>>,
}

impl FeedbackLog {
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Charge le fichier s'il existe. Un fichier corrompu est une erreur.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, RegistryError> {
        let path = path.into();
        let records: Vec<FeedbackRecord> = match fs::read_to_string(&path) {
            Ok(txt) if txt.trim().is_empty() => Vec::new(),
            Ok(txt) => serde_json::from_str(&txt)
                .map_err(|e| unavailable(format!("{} is not a valid feedback file: {e}", path.display())))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(unavailable(format!("cannot read {}: {e}", path.display()))),
        };
        info!(?path, records = records.len(), "[feedback] log opened");
        Ok(Self {
            storage_path: Some(path),
            records: Mutex::new(records),
        })
    }

    fn save_to_disk(&self, records: &[FeedbackRecord]) -> Result<(), RegistryError> {
        let Some(path) = &self.storage_path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }
        let json = serde_json::to_string_pretty(records).map_err(unavailable)?;
        write_atomically(path, json.as_bytes()).map_err(unavailable)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn append(&self, input: NewFeedback) -> Result<FeedbackRecord, RegistryError> {
        let field = |name: &str, v: &str| {
            let v = v.trim();
            if v.is_empty() {
                Err(RegistryError::Validation(format!("feedback field '{name}' is required")))
            } else {
                Ok(v.to_string())
            }
        };

        let record = FeedbackRecord {
            id: Uuid::new_v4().to_string(),
            initial: field("initial", &input.initial)?,
            tokenized: field("tokenized", &input.tokenized)?,
            userfeedback: field("userfeedback", &input.userfeedback)?,
            service: input.service.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            created_at: OffsetDateTime::now_utc(),
        };

        let mut records = self.records.lock();
        records.push(record.clone());
        if let Err(e) = self.save_to_disk(&records) {
            records.pop();
            return Err(e);
        }
        Ok(record)
    }

    /// Page `page` (base 1) de `limit` entrées ; valeurs < 1 => défauts.
    pub fn list(&self, page: Option<usize>, limit: Option<usize>) -> FeedbackPage {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = limit.filter(|l| *l >= 1).unwrap_or(DEFAULT_PAGE_LIMIT);

        // ordre d'ajout conservé : parcours inverse = plus récents d'abord
        let records = self.records.lock();
        let total_entries = records.len();
        let data: Vec<FeedbackRecord> = records
            .iter()
            .rev()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();

        FeedbackPage {
            count: data.len(),
            pagination: Pagination {
                current_page: page,
                total_pages: total_entries.div_ceil(limit),
                total_entries,
                limit,
            },
            data,
        }
    }

    pub fn suggestions(&self, service_name: &str, limit: Option<usize>) -> Vec<Suggestion> {
        let limit = limit
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_SUGGESTION_LIMIT)
            .min(MAX_SUGGESTION_LIMIT);

        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| r.service.as_deref() == Some(service_name))
            .take(limit)
            .map(|r| Suggestion {
                value: r.tokenized.clone(),
                timestamp: r.created_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb(initial: &str, tokenized: &str, service: Option<&str>) -> NewFeedback {
        NewFeedback {
            initial: initial.into(),
            tokenized: tokenized.into(),
            userfeedback: "good".into(),
            service: service.map(String::from),
        }
    }

    #[test]
    fn append_requires_all_text_fields() {
        let log = FeedbackLog::in_memory();
        assert!(log.append(fb("", "x", None)).is_err());
        assert!(log.append(fb("hi", "  ", None)).is_err());
        let mut missing = fb("hi", "greeting", None);
        missing.userfeedback = String::new();
        assert!(matches!(log.append(missing), Err(RegistryError::Validation(_))));
        assert!(log.is_empty());
    }

    #[test]
    fn pagination_is_newest_first() {
        let log = FeedbackLog::in_memory();
        for i in 0..25 {
            log.append(fb(&format!("msg {i}"), "label", None)).unwrap();
        }
        let first = log.list(None, None);
        assert_eq!(first.count, 10);
        assert_eq!(first.pagination.total_pages, 3);
        assert_eq!(first.pagination.total_entries, 25);

        let last = log.list(Some(3), Some(10));
        assert_eq!(last.count, 5);
        assert_eq!(first.data[0].initial, "msg 24");
        assert_eq!(first.data[9].initial, "msg 15");
        assert_eq!(last.data[4].initial, "msg 0");

        let clamped = log.list(Some(0), Some(0));
        assert_eq!(clamped.pagination.current_page, 1);
        assert_eq!(clamped.pagination.limit, DEFAULT_PAGE_LIMIT);

        assert_eq!(log.list(Some(9), None).count, 0);
    }

    #[test]
    fn suggestions_filter_by_service_and_limit() {
        let log = FeedbackLog::in_memory();
        log.append(fb("reset?", "password_reset_query", Some("chat"))).unwrap();
        log.append(fb("slow", "performance_issue_dashboard", Some("vision"))).unwrap();
        log.append(fb("export", "feature_request_export_csv", Some("chat"))).unwrap();

        let s = log.suggestions("chat", None);
        assert_eq!(s.len(), 2);
        assert!(s.iter().all(|x| x.value != "performance_issue_dashboard"));
        assert_eq!(s[0].value, "feature_request_export_csv");
        assert_eq!(s[1].value, "password_reset_query");
        assert_eq!(log.suggestions("chat", Some(1)).len(), 1);
        assert!(log.suggestions("unknown", None).is_empty());
    }

    #[test]
    fn file_backed_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        {
            let log = FeedbackLog::open(&path).unwrap();
            log.append(fb("thanks!", "positive_feedback_support", Some("chat"))).unwrap();
        }
        let log = FeedbackLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.suggestions("chat", None)[0].value, "positive_feedback_support");
        assert!(!dir.path().join("feedback.json.tmp").exists());
    }

    #[test]
    fn corrupt_feedback_file_is_refused_and_left_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let truncated = r#"[{"id":"1","initial":"hello","tokenized":"greeting","#;
        fs::write(&path, truncated).unwrap();

        assert!(matches!(FeedbackLog::open(&path), Err(RegistryError::StoreUnavailable(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), truncated);
    }
}
