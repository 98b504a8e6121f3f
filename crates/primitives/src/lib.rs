#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Fixed-width numeric and byte primitives used by every layer of the execution engine.
//!
//! This crate does not reinvent big-integer arithmetic: `U256`, `U64`, `Address`, `B256` and
//! friends are re-exported from [`alloy_primitives`], the fixed-width byte/integer library the
//! rest of the Ethereum Rust ecosystem already uses. What this crate adds is the handful of
//! EVM-specific numeric operations the reference spec calls out that `alloy_primitives` doesn't
//! provide directly: two's-complement signed views for `SDIV`/`SMOD`/`SLT`/`SGT`/`SAR`, clamped
//! shifts, `ceil32`, and the arbitrary-precision `taylor_exponential` used for blob base-fee math.

pub use alloy_primitives::{
    address, b256, keccak256, Address, Bytes, Log, LogData, Signature, B256, U256, U64,
};

mod uint;
pub use uint::{ceil32, taylor_exponential, Uint};

mod signed;
pub use signed::{from_signed, signed_cmp, to_signed, Sign};
