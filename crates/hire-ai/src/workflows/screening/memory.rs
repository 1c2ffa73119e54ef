//! In-process store backing every repository trait.
//!
//! All tables sit behind one mutex, so each mutation is serialized and every
//! check-then-write (notably the single in-flight screening per applicant) is atomic.
//! A store opened on a snapshot file writes the whole state through to it after every
//! mutation, replacing the file atomically, and reloads it on the next start.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Applicant, ApplicantId, CvFile, CvFileId, CvFileStatus, CvFileSummary, JobPost, JobPostId,
    ScreeningResult, ScreeningResultId, ScreeningState, ScreeningStatus,
};
use super::repository::{
    finish_result, ApplicantDirectory, ApplicantRepository, ApplicantSort, CvFileRepository,
    CvFileTransition, DirectoryPage, DirectoryQuery, DirectoryRow, JobPostRepository, OwnerScope,
    RepositoryError, ScreeningResultRepository, ScreeningRow, INTERRUPTED_MESSAGE,
};

const EXTRACTION_INTERRUPTED: &str = "extraction interrupted";

/// A stored record plus its insertion sequence, used to break timestamp ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row<T> {
    seq: u64,
    record: T,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    job_posts: HashMap<JobPostId, Row<JobPost>>,
    applicants: HashMap<ApplicantId, Row<Applicant>>,
    cv_files: HashMap<CvFileId, Row<CvFile>>,
    results: HashMap<ScreeningResultId, Row<ScreeningRow>>,
    files_by_applicant: HashMap<ApplicantId, Vec<CvFileId>>,
    results_by_applicant: HashMap<ApplicantId, Vec<ScreeningResultId>>,
    /// Unique index over `Processing` rows.
    in_flight: HashMap<ApplicantId, ScreeningResultId>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn latest_result(&self, applicant_id: ApplicantId) -> Option<&Row<ScreeningRow>> {
        self.results_by_applicant
            .get(&applicant_id)?
            .iter()
            .filter_map(|id| self.results.get(id))
            .max_by(|a, b| newest_first(b.record.created_at, b.seq, a.record.created_at, a.seq))
    }

    fn latest_completed_score(&self, applicant_id: ApplicantId) -> Option<u8> {
        self.results_by_applicant
            .get(&applicant_id)?
            .iter()
            .filter_map(|id| self.results.get(id))
            .filter(|row| row.record.status == ScreeningStatus::Completed)
            .max_by(|a, b| newest_first(b.record.created_at, b.seq, a.record.created_at, a.seq))
            .and_then(|row| row.record.overall_score)
    }

    fn results_where(
        &self,
        keep: impl Fn(&ScreeningRow) -> bool,
    ) -> Vec<ScreeningResult> {
        let mut rows: Vec<&Row<ScreeningRow>> =
            self.results.values().filter(|row| keep(&row.record)).collect();
        rows.sort_by(|a, b| newest_first(a.record.created_at, a.seq, b.record.created_at, b.seq));
        rows.into_iter()
            .map(|row| ScreeningResult::from(row.record.clone()))
            .collect()
    }
}

/// Orders `a` before `b` when `a` is newer; later insertion wins ties.
fn newest_first(a_at: DateTime<Utc>, a_seq: u64, b_at: DateTime<Utc>, b_seq: u64) -> Ordering {
    b_at.cmp(&a_at).then(b_seq.cmp(&a_seq))
}

/// On-disk shape of the tables. Secondary indexes are rebuilt on load.
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    next_seq: u64,
    job_posts: Vec<Row<JobPost>>,
    applicants: Vec<Row<Applicant>>,
    cv_files: Vec<Row<CvFile>>,
    results: Vec<Row<ScreeningRow>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    next_seq: u64,
    job_posts: Vec<&'a Row<JobPost>>,
    applicants: Vec<&'a Row<Applicant>>,
    cv_files: Vec<&'a Row<CvFile>>,
    results: Vec<&'a Row<ScreeningRow>>,
}

/// Work left half-done by a previous process, closed out while loading.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Recovered {
    pub screenings: usize,
    pub cv_files: usize,
}

impl Tables {
    fn snapshot(&self) -> SnapshotRef<'_> {
        fn by_seq<T>(rows: &HashMap<impl std::hash::Hash + Eq, Row<T>>) -> Vec<&Row<T>> {
            let mut rows: Vec<&Row<T>> = rows.values().collect();
            rows.sort_by_key(|row| row.seq);
            rows
        }

        SnapshotRef {
            next_seq: self.next_seq,
            job_posts: by_seq(&self.job_posts),
            applicants: by_seq(&self.applicants),
            cv_files: by_seq(&self.cv_files),
            results: by_seq(&self.results),
        }
    }

    /// No process survives a restart, so rows still marked in progress are closed as failures.
    fn restore(snapshot: Snapshot, now: DateTime<Utc>) -> (Self, Recovered) {
        let mut tables = Tables {
            next_seq: snapshot.next_seq,
            ..Tables::default()
        };
        let mut recovered = Recovered::default();

        for row in snapshot.job_posts {
            tables.job_posts.insert(row.record.id, row);
        }
        for row in snapshot.applicants {
            tables.applicants.insert(row.record.id, row);
        }
        for mut row in snapshot.cv_files {
            if row.record.status == CvFileStatus::Processing {
                row.record.status = CvFileStatus::Error;
                row.record.extracted_text = None;
                row.record.failure_reason = Some(EXTRACTION_INTERRUPTED.to_string());
                recovered.cv_files += 1;
            }
            tables
                .files_by_applicant
                .entry(row.record.applicant_id)
                .or_default()
                .push(row.record.id);
            tables.cv_files.insert(row.record.id, row);
        }
        for mut row in snapshot.results {
            if row.record.status == ScreeningStatus::Processing {
                let state = ScreeningState::Failed {
                    error_message: INTERRUPTED_MESSAGE.to_string(),
                };
                if let Ok(finished) =
                    finish_result(ScreeningResult::from(row.record.clone()), state, now)
                {
                    row.record = ScreeningRow::from(&finished);
                    recovered.screenings += 1;
                }
            }
            if row.record.status == ScreeningStatus::Processing {
                tables.in_flight.insert(row.record.applicant_id, row.record.id);
            }
            tables
                .results_by_applicant
                .entry(row.record.applicant_id)
                .or_default()
                .push(row.record.id);
            tables.results.insert(row.record.id, row);
        }

        let highest = tables
            .job_posts
            .values()
            .map(|row| row.seq)
            .chain(tables.applicants.values().map(|row| row.seq))
            .chain(tables.cv_files.values().map(|row| row.seq))
            .chain(tables.results.values().map(|row| row.seq))
            .max()
            .unwrap_or(0);
        tables.next_seq = tables.next_seq.max(highest);

        (tables, recovered)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Volatile store; everything is lost with the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable store backed by a JSON snapshot at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, Recovered), RepositoryError> {
        let path = path.into();
        let snapshot = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|err| {
                RepositoryError::Unavailable(format!(
                    "snapshot {} is unreadable: {err}",
                    path.display()
                ))
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => Snapshot::default(),
            Err(err) => {
                return Err(RepositoryError::Unavailable(format!(
                    "snapshot {} could not be read: {err}",
                    path.display()
                )))
            }
        };

        let (tables, recovered) = Tables::restore(snapshot, Utc::now());
        let store = Self {
            tables: Mutex::new(tables),
            snapshot_path: Some(path),
        };

        if recovered != Recovered::default() {
            warn!(
                screenings = recovered.screenings,
                cv_files = recovered.cv_files,
                "closed work interrupted by the previous shutdown"
            );
        }
        {
            let tables = store.tables()?;
            store.commit(&tables)?;
            info!(
                job_posts = tables.job_posts.len(),
                applicants = tables.applicants.len(),
                screenings = tables.results.len(),
                "recruitment store loaded"
            );
        }
        Ok((store, recovered))
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Write the tables through to the snapshot file, if any. Called with the lock held.
    fn commit(&self, tables: &Tables) -> Result<(), RepositoryError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let unavailable = |err: std::io::Error| {
            RepositoryError::Unavailable(format!("snapshot {} not written: {err}", path.display()))
        };

        let bytes = serde_json::to_vec(&tables.snapshot())
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, bytes).map_err(unavailable)?;
        fs::rename(&staging, path).map_err(unavailable)
    }

    /// Persisted column shape of a screening row, for storage-level inspection.
    pub fn screening_row(&self, id: ScreeningResultId) -> Result<Option<ScreeningRow>, RepositoryError> {
        Ok(self.tables()?.results.get(&id).map(|row| row.record.clone()))
    }

    pub fn screening_row_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.tables()?.results.len())
    }
}

impl JobPostRepository for MemoryStore {
    fn insert_job_post(&self, job: JobPost) -> Result<JobPost, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.job_posts.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        let seq = tables.next_seq();
        tables.job_posts.insert(
            job.id,
            Row {
                seq,
                record: job.clone(),
            },
        );
        self.commit(&tables)?;
        Ok(job)
    }

    fn modify_job_post(
        &self,
        id: JobPostId,
        change: &mut dyn FnMut(JobPost) -> JobPost,
    ) -> Result<JobPost, RepositoryError> {
        let mut tables = self.tables()?;
        let row = tables.job_posts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let mut updated = change(row.record.clone());
        updated.id = row.record.id;
        updated.owner_id = row.record.owner_id.clone();
        row.record = updated.clone();
        self.commit(&tables)?;
        Ok(updated)
    }

    fn job_post(&self, id: JobPostId) -> Result<Option<JobPost>, RepositoryError> {
        Ok(self.tables()?.job_posts.get(&id).map(|row| row.record.clone()))
    }

    fn job_posts(&self, scope: &OwnerScope) -> Result<Vec<JobPost>, RepositoryError> {
        let tables = self.tables()?;
        let mut rows: Vec<&Row<JobPost>> = tables
            .job_posts
            .values()
            .filter(|row| scope.includes(&row.record.owner_id))
            .collect();
        rows.sort_by(|a, b| newest_first(a.record.posted_at, a.seq, b.record.posted_at, b.seq));
        Ok(rows.into_iter().map(|row| row.record.clone()).collect())
    }
}

impl ApplicantRepository for MemoryStore {
    fn insert_applicant(&self, applicant: Applicant) -> Result<Applicant, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.job_posts.contains_key(&applicant.job_post_id) {
            return Err(RepositoryError::ForeignKey("job post"));
        }
        if tables.applicants.contains_key(&applicant.id) {
            return Err(RepositoryError::Conflict);
        }
        let seq = tables.next_seq();
        tables.applicants.insert(
            applicant.id,
            Row {
                seq,
                record: applicant.clone(),
            },
        );
        self.commit(&tables)?;
        Ok(applicant)
    }

    fn modify_applicant(
        &self,
        id: ApplicantId,
        change: &mut dyn FnMut(Applicant) -> Applicant,
    ) -> Result<Applicant, RepositoryError> {
        let mut tables = self.tables()?;
        let row = tables.applicants.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let mut updated = change(row.record.clone());
        updated.id = row.record.id;
        updated.job_post_id = row.record.job_post_id;
        row.record = updated.clone();
        self.commit(&tables)?;
        Ok(updated)
    }

    fn applicant(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        Ok(self.tables()?.applicants.get(&id).map(|row| row.record.clone()))
    }

    fn applicants(&self, ids: &[ApplicantId]) -> Result<Vec<Applicant>, RepositoryError> {
        let tables = self.tables()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.applicants.get(id))
            .map(|row| row.record.clone())
            .collect())
    }

    fn applicants_for_job(
        &self,
        job_post_id: JobPostId,
    ) -> Result<Vec<Applicant>, RepositoryError> {
        let tables = self.tables()?;
        let mut rows: Vec<&Row<Applicant>> = tables
            .applicants
            .values()
            .filter(|row| row.record.job_post_id == job_post_id)
            .collect();
        rows.sort_by_key(|row| row.seq);
        Ok(rows.into_iter().map(|row| row.record.clone()).collect())
    }
}

impl CvFileRepository for MemoryStore {
    fn insert_cv_file(&self, file: CvFile) -> Result<CvFile, RepositoryError> {
        let mut tables = self.tables()?;
        if !tables.applicants.contains_key(&file.applicant_id) {
            return Err(RepositoryError::ForeignKey("applicant"));
        }
        if tables.cv_files.contains_key(&file.id) {
            return Err(RepositoryError::Conflict);
        }
        let seq = tables.next_seq();
        tables
            .files_by_applicant
            .entry(file.applicant_id)
            .or_default()
            .push(file.id);
        tables.cv_files.insert(
            file.id,
            Row {
                seq,
                record: file.clone(),
            },
        );
        self.commit(&tables)?;
        Ok(file)
    }

    fn cv_file(&self, id: CvFileId) -> Result<Option<CvFile>, RepositoryError> {
        Ok(self.tables()?.cv_files.get(&id).map(|row| row.record.clone()))
    }

    fn cv_files_for_applicant(
        &self,
        applicant_id: ApplicantId,
    ) -> Result<Vec<CvFile>, RepositoryError> {
        let tables = self.tables()?;
        let mut rows: Vec<&Row<CvFile>> = tables
            .files_by_applicant
            .get(&applicant_id)
            .map(|ids| ids.iter().filter_map(|id| tables.cv_files.get(id)).collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| {
            newest_first(a.record.uploaded_at, a.seq, b.record.uploaded_at, b.seq)
        });
        Ok(rows.into_iter().map(|row| row.record.clone()).collect())
    }

    fn transition_cv_file(
        &self,
        id: CvFileId,
        transition: CvFileTransition,
    ) -> Result<CvFile, RepositoryError> {
        let mut tables = self.tables()?;
        let row = tables.cv_files.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let mut updated = row.record.clone();
        transition.apply(&mut updated)?;
        row.record = updated.clone();
        self.commit(&tables)?;
        Ok(updated)
    }

    fn delete_cv_file(&self, id: CvFileId) -> Result<CvFile, RepositoryError> {
        let mut tables = self.tables()?;
        let status = tables
            .cv_files
            .get(&id)
            .map(|row| row.record.status)
            .ok_or(RepositoryError::NotFound)?;
        if status == CvFileStatus::Processing {
            return Err(RepositoryError::InvalidTransition {
                from: status.label(),
                to: "deleted",
            });
        }

        let removed = tables
            .cv_files
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?
            .record;
        if let Some(ids) = tables.files_by_applicant.get_mut(&removed.applicant_id) {
            ids.retain(|file_id| *file_id != id);
        }
        self.commit(&tables)?;
        Ok(removed)
    }
}

impl ScreeningResultRepository for MemoryStore {
    fn begin_screening(&self, result: ScreeningResult) -> Result<ScreeningResult, RepositoryError> {
        if result.status() != ScreeningStatus::Processing {
            return Err(RepositoryError::InvalidTransition {
                from: "new",
                to: result.status().label(),
            });
        }

        let mut tables = self.tables()?;
        if !tables.applicants.contains_key(&result.applicant_id) {
            return Err(RepositoryError::ForeignKey("applicant"));
        }
        if !tables.job_posts.contains_key(&result.job_post_id) {
            return Err(RepositoryError::ForeignKey("job post"));
        }
        if tables.in_flight.contains_key(&result.applicant_id) || tables.results.contains_key(&result.id) {
            return Err(RepositoryError::Conflict);
        }

        let seq = tables.next_seq();
        tables.in_flight.insert(result.applicant_id, result.id);
        tables
            .results_by_applicant
            .entry(result.applicant_id)
            .or_default()
            .push(result.id);
        tables.results.insert(
            result.id,
            Row {
                seq,
                record: ScreeningRow::from(&result),
            },
        );
        self.commit(&tables)?;
        Ok(result)
    }

    fn finish_screening(
        &self,
        id: ScreeningResultId,
        state: ScreeningState,
        at: DateTime<Utc>,
    ) -> Result<ScreeningResult, RepositoryError> {
        let mut tables = self.tables()?;
        let row = tables.results.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        let finished = finish_result(ScreeningResult::from(row.record.clone()), state, at)?;
        row.record = ScreeningRow::from(&finished);

        if tables.in_flight.get(&finished.applicant_id) == Some(&id) {
            tables.in_flight.remove(&finished.applicant_id);
        }
        self.commit(&tables)?;
        Ok(finished)
    }

    fn screening_result(
        &self,
        id: ScreeningResultId,
    ) -> Result<Option<ScreeningResult>, RepositoryError> {
        Ok(self
            .tables()?
            .results
            .get(&id)
            .map(|row| ScreeningResult::from(row.record.clone())))
    }

    fn screening_results_for_applicant(
        &self,
        applicant_id: ApplicantId,
    ) -> Result<Vec<ScreeningResult>, RepositoryError> {
        Ok(self
            .tables()?
            .results_where(|row| row.applicant_id == applicant_id))
    }

    fn screening_results_for_job(
        &self,
        job_post_id: JobPostId,
    ) -> Result<Vec<ScreeningResult>, RepositoryError> {
        Ok(self
            .tables()?
            .results_where(|row| row.job_post_id == job_post_id))
    }

    fn delete_screening_result(
        &self,
        id: ScreeningResultId,
    ) -> Result<ScreeningResult, RepositoryError> {
        let mut tables = self.tables()?;
        let status = tables
            .results
            .get(&id)
            .map(|row| row.record.status)
            .ok_or(RepositoryError::NotFound)?;
        if !status.is_terminal() {
            return Err(RepositoryError::InvalidTransition {
                from: status.label(),
                to: "deleted",
            });
        }

        let removed = tables
            .results
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?
            .record;
        if let Some(ids) = tables.results_by_applicant.get_mut(&removed.applicant_id) {
            ids.retain(|result_id| *result_id != id);
        }
        self.commit(&tables)?;
        Ok(ScreeningResult::from(removed))
    }
}

impl ApplicantDirectory for MemoryStore {
    fn list_applicants(&self, query: &DirectoryQuery) -> Result<DirectoryPage, RepositoryError> {
        let tables = self.tables()?;

        // Scope and filter in the same pass so out-of-scope rows never reach the count.
        let mut matches: Vec<(&Row<Applicant>, &JobPost, Option<&ScreeningRow>)> = tables
            .applicants
            .values()
            .filter(|row| query.filter.matches(&row.record))
            .filter_map(|row| {
                let job = &tables.job_posts.get(&row.record.job_post_id)?.record;
                query.scope.includes(&job.owner_id).then_some((
                    row,
                    job,
                    tables.latest_result(row.record.id).map(|latest| &latest.record),
                ))
            })
            .collect();

        let total_count = matches.len();
        matches.sort_by(|(a, _, _), (b, _, _)| {
            let by_applied = || newest_first(a.record.applied_at, a.seq, b.record.applied_at, b.seq);
            match query.sort {
                ApplicantSort::AppliedAtDesc => by_applied(),
                ApplicantSort::AppliedAtAsc => by_applied().reverse(),
                ApplicantSort::NameAsc => name_key(&a.record).cmp(&name_key(&b.record)).then_with(by_applied),
                ApplicantSort::NameDesc => name_key(&b.record).cmp(&name_key(&a.record)).then_with(by_applied),
                ApplicantSort::ScoreDesc => {
                    let a_score = tables.latest_completed_score(a.record.id);
                    let b_score = tables.latest_completed_score(b.record.id);
                    b_score.cmp(&a_score).then_with(by_applied)
                }
                ApplicantSort::StatusAsc => a.record.status.cmp(&b.record.status).then_with(by_applied),
            }
        });

        let rows = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(row, job, latest)| {
                let mut files: Vec<&Row<CvFile>> = tables
                    .files_by_applicant
                    .get(&row.record.id)
                    .map(|ids| ids.iter().filter_map(|id| tables.cv_files.get(id)).collect())
                    .unwrap_or_default();
                files.sort_by(|a, b| {
                    newest_first(a.record.uploaded_at, a.seq, b.record.uploaded_at, b.seq)
                });

                DirectoryRow {
                    applicant: row.record.clone(),
                    job_title: job.title.clone(),
                    cv_files: files
                        .into_iter()
                        .map(|file| CvFileSummary::from(&file.record))
                        .collect(),
                    latest_screening: latest
                        .map(|latest| ScreeningResult::from(latest.clone()).snapshot()),
                }
            })
            .collect();

        Ok(DirectoryPage { rows, total_count })
    }
}

fn name_key(applicant: &Applicant) -> (String, String) {
    (
        applicant.last_name.to_lowercase(),
        applicant.first_name.to_lowercase(),
    )
}
