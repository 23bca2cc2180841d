use testboard_interchange::{RecordStatus, SnapshotRecord};

/// Per-status totals for one snapshot.
///
/// `total` counts every record; the other three only exact matches, so
/// `passed + failed + skipped <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl SummaryCounts {
    pub fn from_records(records: &[SnapshotRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, record| {
            acc.count(record.status());
            acc
        })
    }

    fn count(&mut self, status: Option<&str>) {
        match status.and_then(RecordStatus::from_status) {
            Some(RecordStatus::Passed) => self.passed += 1,
            Some(RecordStatus::Failed) => self.failed += 1,
            Some(RecordStatus::Skipped) => self.skipped += 1,
            None => {}
        }
        self.total += 1;
    }
}
