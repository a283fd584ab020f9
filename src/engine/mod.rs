// 8.0: calculator engine. the session owns user state; each evaluation pass
// groups positions, prices them, derives cross-margin liquidation prices and
// the account summary. deterministic, no I/O inside a pass.

mod core;
mod evaluate;
mod results;

pub use core::Session;
pub use evaluate::evaluate_positions;
pub use results::{EngineError, Evaluation, IndividualResult, RefreshResult};
