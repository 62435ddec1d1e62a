pub mod batch_state;
pub mod row_ctx;
pub mod row_flow;

pub use batch_state::{transition, BatchState, RowUpdate, TransitionError};
pub use row_ctx::RowCtx;
pub use row_flow::{compose_instruction, RowFlow};
