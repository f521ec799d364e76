pub mod fetch;
pub mod progress;
pub mod rate_limit;
pub mod schedule;
pub mod upload;

pub use fetch::{DistrictError, FetchMode, FetchOptions, FetchReport, FetchRequest, UploadSummary};
pub use progress::{
    CreateOperation, OperationType, ProgressOperation, ProgressStatus, ProgressUpdate,
};
pub use rate_limit::{RateLimitConfig, RateLimitPreset, TokenBucketConfig};
pub use schedule::{ScheduleEntry, ScheduleQuery, ScheduleRow};
pub use upload::{
    NewUploadLog, RowError, UploadLog, UploadRequest, UploadResponse, UploadResult, UploadStatus,
};
