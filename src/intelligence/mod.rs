pub mod analysis;
pub mod engine;
pub mod matcher;
pub mod report;
pub mod scorer;

pub use analysis::{build_regret, build_win, format_usd, ValueOverflow};
pub use engine::{EngineSettings, RegretEngine};
pub use matcher::{match_fifo, FifoMatch};
pub use report::{assemble_report, empty_report, share_text, ReportParts};
pub use scorer::{average_hold_time, emotional_damage, patience_score, regret_score};
