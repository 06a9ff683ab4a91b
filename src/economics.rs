/// Economics module: the block reward schedule

/// Reward paid to a miner at difficulty zero.
pub const BASE_REWARD: i64 = 100;

/// The reward halves every time difficulty grows by this many bits.
pub const HALVING_INTERVAL: u32 = 4;

/// The reward never drops below this floor.
pub const MIN_REWARD: i64 = 1;

/// Block reward for a given proof-of-work difficulty.
///
/// Monotonically non-increasing in `difficulty`: `BASE_REWARD >> (difficulty / HALVING_INTERVAL)`,
/// clamped to [`MIN_REWARD`].
pub fn reward_for_difficulty(difficulty: u32) -> i64 {
    let halvings = difficulty / HALVING_INTERVAL;
    if halvings >= i64::BITS - 1 {
        return MIN_REWARD;
    }
    (BASE_REWARD >> halvings).max(MIN_REWARD)
}
