pub mod block;
pub mod ledger;

pub use block::Block;
pub use ledger::{ChainState, Ledger};

/// Default Proof-of-Work difficulty (number of leading zero hex digits).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Default amount paid to the miner of a block.
pub const DEFAULT_BLOCK_REWARD: u64 = 10;

/// Sender of mining rewards.
pub const SYSTEM_ADDRESS: &str = "SYSTEM";

pub const REWARD_MESSAGE: &str = "Here is your mining reward";
