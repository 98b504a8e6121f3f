#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod errors;
pub use errors::{BlockError, BlockResult, FrameError, FrameResult};

mod constants;

mod config;
pub use config::ForkConfig;

pub mod state;
pub use state::{Account, JournaledState};

mod tx;
pub use tx::{Authorization, RecoveredTransaction, Transaction, TxEnvelope};

mod gas;

pub mod evm;
pub use evm::{Frame, Message};

mod precompile;

mod system;

mod bal;
pub use bal::{AccountChanges, BlockAccessList, BlockAccessListTracker};

mod block;
pub use block::{Block, BlockEnvironment, BlockExecutor, BlockHeader, ExecutedBlock, Withdrawal};

mod builder;
pub use builder::BlockExecutorBuilder;
