//! The EVM: operand stack, linear memory, opcode table, and the frame-based interpreter (C7/C8).

pub mod memory;
pub mod opcodes;
pub mod stack;

mod frame;
mod interpreter;

pub use frame::{CallScheme, Frame, Message};
pub use interpreter::{
    create2_address, create_address, execute_frame, BlockContext, ExecutionContext, TxContext,
};
