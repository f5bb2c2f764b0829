pub mod aggregate;
pub mod client;
pub mod credentials;
pub mod csv_utils;
pub mod errors;
pub mod export;
pub mod keystore;
pub mod login;
pub mod models;
pub mod output;
pub mod paging;
pub mod session;

pub use aggregate::{enrich, join, project, retain_private_only, EnrichStats, UnmatchedPolicy, WorldLookup};
pub use client::{ClientOptions, RateLimiter, VrcClient, DEFAULT_BASE_URL, DEFAULT_REQUEST_DELAY_MS};
pub use credentials::{CredentialStore, LocalScope, COOKIE_FILE};
pub use csv_utils::{read_records, write_records, FIELDNAMES};
pub use errors::{ErrorClass, ExportError, SessionError, TrackerError};
pub use export::{
    block_on, export_favorites, ExportOptions, ExportProgress, ExportResult, ExportStage,
    ProgressCallback,
};
pub use login::{run_blocking_login, InteractiveLogin, LoginOutcome, LOGIN_PAGE_URL};
pub use models::{AggregatedRecord, CredentialSet, CurrentUser, WorldStatus};
pub use output::{write_report, OutputFormat};
pub use paging::collect_all;
pub use session::{logout, Session, SessionState, SessionValidator};
