/// UTC timestamp used for job start times.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monotonic identifier assigned to each launched job.
///
/// Distinguishes two jobs that ran for the same account across a
/// terminate/exit race, so a late exit report never removes the wrong job.
pub type JobId = u64;
