pub mod adaptive;
pub mod additive;
pub mod cache;
pub mod command;
pub mod component;
pub mod config;
pub mod ddmin;
pub mod engine;
pub mod enumerator;
pub mod history;
pub mod imcs;
pub mod oracle;
pub mod quickxplain;
pub mod report;
pub mod search;
pub mod session;

pub use adaptive::{AdaptiveSearch, DEFAULT_ADAPTIVE_THRESHOLD};
pub use additive::{AdditiveSearch, find_one_culprit};
pub use cache::KnowledgeBase;
pub use command::{CommandOracle, CommandOracleConfig, InputDelivery};
pub use component::{Component, ComponentSet};
pub use config::{ConfigError, CulpritConfig};
pub use ddmin::Ddmin;
pub use engine::{EngineError, ImcsEngine, SearchState, SteppedEnumeration, TestPlan};
pub use enumerator::{CacheScope, Enumeration, Enumerator};
pub use history::{CompletedTest, ExecutionLog, UndoStack};
pub use imcs::ImcsSearch;
pub use oracle::{CountingOracle, FnOracle, Oracle, OracleError, PlantedOracle, Verdict};
pub use quickxplain::QuickXplain;
pub use report::{ConflictReport, SearchReport};
pub use search::{Algorithm, ConflictSearch, SearchError};
pub use session::{SearchOutcome, Session};
