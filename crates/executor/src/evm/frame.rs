//! Call/create frame types (C8): the `Message` a frame is invoked with, and the `Frame` result it
//! returns to its caller.

use alloy_primitives::{Address, Bytes, U256};

use crate::errors::FrameError;

/// How a child frame was entered, distinguishing the handful of semantic differences between the
/// `CALL`-family opcodes and contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScheme {
    /// A plain `CALL`: runs in the callee's own context, with its own storage and code.
    Call,
    /// `CALLCODE`: runs the callee's code in the caller's storage/address context.
    CallCode,
    /// `DELEGATECALL`: like `CALLCODE`, but also inherits the caller's `caller()`/`callvalue()`.
    DelegateCall,
    /// `STATICCALL`: like `CALL`, but forbids state mutation for the remainder of the subtree.
    StaticCall,
}

/// The kind of child frame being entered: a message call, or contract creation.
#[derive(Debug, Clone)]
pub enum Message {
    /// A `CALL`/`CALLCODE`/`DELEGATECALL`/`STATICCALL` invocation.
    Call {
        /// Invocation flavor.
        scheme: CallScheme,
        /// The account whose code is executed.
        code_address: Address,
        /// The account whose storage/balance this frame reads and writes (equals `code_address`
        /// except for `CALLCODE`/`DELEGATECALL`).
        storage_address: Address,
        /// `msg.sender` as observed by the callee.
        caller: Address,
        /// `msg.value` as observed by the callee (zero for `DELEGATECALL`/`STATICCALL`, though
        /// `DELEGATECALL` reports the parent's value via [`CallScheme::DelegateCall`] handling
        /// upstream).
        value: U256,
        /// Calldata.
        input: Bytes,
        /// Gas forwarded to this frame.
        gas_limit: u64,
        /// Whether this frame (and every frame beneath it) forbids state mutation.
        is_static: bool,
    },
    /// `CREATE`/`CREATE2`.
    Create {
        /// The deployer.
        caller: Address,
        /// The deployed contract's address, already derived by the caller.
        new_address: Address,
        /// Value transferred to the new contract.
        value: U256,
        /// Init code.
        init_code: Bytes,
        /// Gas forwarded to this frame.
        gas_limit: u64,
    },
}

impl Message {
    /// Gas forwarded to this frame.
    pub const fn gas_limit(&self) -> u64 {
        match self {
            Self::Call { gas_limit, .. } => *gas_limit,
            Self::Create { gas_limit, .. } => *gas_limit,
        }
    }

    /// Whether this frame runs in a static (non-mutating) context.
    pub const fn is_static(&self) -> bool {
        match self {
            Self::Call { is_static, .. } => *is_static,
            Self::Create { .. } => false,
        }
    }

    /// The address whose storage this frame operates against.
    pub const fn address(&self) -> Address {
        match self {
            Self::Call { storage_address, .. } => *storage_address,
            Self::Create { new_address, .. } => *new_address,
        }
    }

    /// `msg.sender` as this frame observes it.
    pub const fn caller(&self) -> Address {
        match self {
            Self::Call { caller, .. } => *caller,
            Self::Create { caller, .. } => *caller,
        }
    }

    /// `msg.value` as this frame observes it.
    pub const fn value(&self) -> U256 {
        match self {
            Self::Call { value, .. } => *value,
            Self::Create { value, .. } => *value,
        }
    }

    /// The code this frame executes: calldata's counterpart for `CREATE`/`CREATE2` is the init
    /// code itself.
    pub fn input_or_init_code(&self) -> &Bytes {
        match self {
            Self::Call { input, .. } => input,
            Self::Create { init_code, .. } => init_code,
        }
    }
}

/// The outcome of running a frame to completion.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Whether the frame completed successfully (`STOP`/`RETURN`, or falling off the end of the
    /// code) rather than reverting or halting exceptionally.
    pub success: bool,
    /// Gas left unconsumed, to be returned to the caller.
    pub gas_left: u64,
    /// The accumulated (uncapped) gas refund counter from `SSTORE`/`SELFDESTRUCT` in this
    /// subtree. Only meaningful when `success` is true.
    pub gas_refund: i64,
    /// `RETURN`/`REVERT` data, or the deployed code for a successful `CREATE`/`CREATE2`.
    pub output: Bytes,
    /// The error that ended the frame, if it did not succeed.
    pub error: Option<FrameError>,
}

impl Frame {
    /// A successful frame with no output.
    pub const fn stop(gas_left: u64) -> Self {
        Self { success: true, gas_left, gas_refund: 0, output: Bytes::new(), error: None }
    }

    /// A successful frame returning `output`.
    pub const fn returned(gas_left: u64, gas_refund: i64, output: Bytes) -> Self {
        Self { success: true, gas_left, gas_refund, output, error: None }
    }

    /// A frame that reverted, preserving `gas_left`.
    pub fn reverted(gas_left: u64, output: Bytes) -> Self {
        Self {
            success: false,
            gas_left,
            gas_refund: 0,
            output: output.clone(),
            error: Some(FrameError::Revert(output)),
        }
    }

    /// A frame that halted exceptionally, burning all of its gas.
    pub const fn halted(error: FrameError) -> Self {
        Self { success: false, gas_left: 0, gas_refund: 0, output: Bytes::new(), error: Some(error) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halted_frame_burns_all_gas() {
        let frame = Frame::halted(FrameError::OutOfGas);
        assert!(!frame.success);
        assert_eq!(frame.gas_left, 0);
    }

    #[test]
    fn reverted_frame_preserves_gas_left() {
        let frame = Frame::reverted(100, Bytes::from_static(b"reason"));
        assert_eq!(frame.gas_left, 100);
        assert!(!frame.success);
        assert!(matches!(frame.error, Some(FrameError::Revert(_))));
    }

    #[test]
    fn delegatecall_message_reports_parent_address() {
        let msg = Message::Call {
            scheme: CallScheme::DelegateCall,
            code_address: Address::repeat_byte(2),
            storage_address: Address::repeat_byte(1),
            caller: Address::repeat_byte(3),
            value: U256::ZERO,
            input: Bytes::new(),
            gas_limit: 1000,
            is_static: false,
        };
        assert_eq!(msg.address(), Address::repeat_byte(1));
    }
}
