//! Proof-of-work search and the mining loop
//!
//! `mine_block` is the CPU-bound part: it stripes the nonce space over a
//! dedicated rayon pool and stops as soon as one worker finds a hash under
//! the target or the caller raises the cancel flag. `Miner` drives it against
//! any [`WorkSource`], either a remote node over HTTP or an in-process chain.

use crate::blockchain::{Block, BlockInfo, Blockchain};
use crate::config::MinerConfig;
use crate::crypto::Address;
use crate::error::{ChainError, Result};
use rayon::prelude::*;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Searches for a nonce that satisfies `difficulty`, using `threads` workers.
///
/// Worker `w` tries nonces `w, w + threads, w + 2 * threads, ...`. Returns
/// `None` if `cancel` is raised before a solution is found.
pub fn mine_block(block: Block, difficulty: u32, threads: usize, cancel: &AtomicBool) -> Option<Block> {
    let threads = threads.max(1);
    if threads == 1 {
        return search(block, difficulty, 0, 1, cancel, &AtomicBool::new(false));
    }

    let pool = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "could not build mining pool, falling back to one thread");
            return search(block, difficulty, 0, 1, cancel, &AtomicBool::new(false));
        }
    };

    let found = AtomicBool::new(false);
    pool.install(|| {
        (0..threads as u64)
            .into_par_iter()
            .find_map_any(|worker| {
                search(block.clone(), difficulty, worker, threads as u64, cancel, &found)
            })
    })
}

fn search(
    mut block: Block,
    difficulty: u32,
    start: u64,
    stride: u64,
    cancel: &AtomicBool,
    found: &AtomicBool,
) -> Option<Block> {
    block.nonce = start;
    loop {
        if cancel.load(Ordering::Relaxed) || found.load(Ordering::Relaxed) {
            return None;
        }
        block.hash = block.compute_hash();
        if Block::meets_difficulty(&block.hash, difficulty) {
            found.store(true, Ordering::Relaxed);
            return Some(block);
        }
        block.nonce = block.nonce.wrapping_add(stride);
    }
}

/// Where the miner gets templates from and hands solved blocks to.
pub trait WorkSource: Send + Sync {
    /// The next block template, or `None` when there is nothing to mine.
    fn next_block(&self) -> impl Future<Output = Result<Option<BlockInfo>>> + Send;

    /// Offers a solved block. A block the node refuses comes back as
    /// `ChainError::InvalidBlock` or `ChainError::Rejected`.
    fn submit_block(&self, block: Block) -> impl Future<Output = Result<()>> + Send;

    /// Current number of blocks, genesis included.
    fn tip(&self) -> impl Future<Output = Result<u64>> + Send;
}

impl WorkSource for Arc<RwLock<Blockchain>> {
    async fn next_block(&self) -> Result<Option<BlockInfo>> {
        Ok(self.read().await.next_block())
    }

    async fn submit_block(&self, block: Block) -> Result<()> {
        self.write().await.add_block(block)
    }

    async fn tip(&self) -> Result<u64> {
        Ok(self.read().await.height())
    }
}

/// Result of one template-to-submission round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerStep {
    /// The node had no pending transactions.
    NoWork,
    Accepted(Block),
    /// The node refused the solved block.
    Rejected(String),
    /// Another block landed at the template's index while mining.
    Superseded(u64),
    /// Shutdown was requested mid-search.
    Stopped,
}

pub struct Miner<S> {
    source: S,
    beneficiary: Address,
    threads: usize,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<S: WorkSource> Miner<S> {
    pub fn new(source: S, beneficiary: impl Into<Address>, config: &MinerConfig) -> Self {
        Miner {
            source,
            beneficiary: beneficiary.into(),
            threads: config.threads.max(1),
            poll_interval: config.poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn beneficiary(&self) -> &str {
        &self.beneficiary
    }

    /// Raising this flag makes `run` return after the current round.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Fetches a template, mines it and submits the result.
    pub async fn mine_once(&self) -> Result<MinerStep> {
        let info = match self.source.next_block().await? {
            Some(info) => info,
            None => return Ok(MinerStep::NoWork),
        };
        debug!(
            index = info.index,
            transactions = info.transactions.len(),
            difficulty = info.difficulty,
            "fetched block template"
        );

        let template = Block::from_block_info(&info, &self.beneficiary);
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        let (difficulty, threads) = (info.difficulty, self.threads);
        let started = Instant::now();

        let mut search = tokio::task::spawn_blocking(move || {
            mine_block(template, difficulty, threads, &worker_cancel)
        });

        let mut superseded = false;
        let mined = loop {
            tokio::select! {
                joined = &mut search => {
                    break joined.map_err(|e| ChainError::MiningError(e.to_string()))?;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    if self.stopping() {
                        cancel.store(true, Ordering::Relaxed);
                        continue;
                    }
                    match self.source.tip().await {
                        Ok(height) if height > info.index => {
                            superseded = true;
                            cancel.store(true, Ordering::Relaxed);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "could not poll chain tip"),
                    }
                }
            }
        };

        let block = match mined {
            Some(block) => block,
            None if superseded => {
                info!(index = info.index, "block superseded, abandoning template");
                return Ok(MinerStep::Superseded(info.index));
            }
            None => return Ok(MinerStep::Stopped),
        };

        info!(
            index = block.index,
            nonce = block.nonce,
            hash = %block.hash,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "found block"
        );

        match self.source.submit_block(block.clone()).await {
            Ok(()) => Ok(MinerStep::Accepted(block)),
            Err(e @ (ChainError::InvalidBlock(_) | ChainError::Rejected(_))) => {
                Ok(MinerStep::Rejected(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Mines until shutdown is requested. Transient errors and rejected blocks
    /// back off exponentially; idle polls wait one `poll_interval`.
    pub async fn run(&self) -> Result<()> {
        let mut backoff = self.poll_interval;
        while !self.stopping() {
            match self.mine_once().await {
                Ok(MinerStep::NoWork) => {
                    debug!("no pending transactions");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Ok(MinerStep::Accepted(block)) => {
                    info!(index = block.index, hash = %block.hash, "block accepted");
                    backoff = self.poll_interval;
                }
                Ok(MinerStep::Rejected(reason)) => {
                    warn!(%reason, retry_in = ?backoff, "block rejected");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Ok(MinerStep::Superseded(_)) | Ok(MinerStep::Stopped) => {}
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "mining round failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
        info!("miner stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::transaction::{Transaction, TransactionInput, TransactionOutput};
    use crate::wallet::Wallet;

    fn quick_config() -> MinerConfig {
        MinerConfig {
            threads: 2,
            poll_interval: Duration::from_millis(10),
            ..MinerConfig::default()
        }
    }

    fn chain_with_pending_tx(difficulty: u32) -> Arc<RwLock<Blockchain>> {
        let mut chain = Blockchain::new(ChainConfig {
            difficulty,
            ..ChainConfig::default()
        });
        let alice = Wallet::create();
        let mut input = TransactionInput::new(alice.address(), 10, "aa".repeat(32));
        alice.sign_input(&mut input);
        chain
            .add_transaction(Transaction::regular(
                vec![input],
                vec![TransactionOutput::new(Wallet::create().address(), 10)],
            ))
            .unwrap();
        Arc::new(RwLock::new(chain))
    }

    #[test]
    fn test_mine_block_single_and_multi_thread() {
        let genesis = Blockchain::genesis_block();
        for threads in [1, 4] {
            let block = Block::new(1, genesis.hash.clone(), vec![], "miner".into());
            let mined = mine_block(block, 8, threads, &AtomicBool::new(false)).unwrap();
            assert!(Block::meets_difficulty(&mined.hash, 8));
            assert_eq!(mined.hash, mined.compute_hash());
        }
    }

    #[test]
    fn test_mine_block_cancelled() {
        let block = Block::new(1, "00".repeat(32), vec![], "miner".into());
        assert!(mine_block(block.clone(), 255, 1, &AtomicBool::new(true)).is_none());
        assert!(mine_block(block, 255, 3, &AtomicBool::new(true)).is_none());
    }

    #[tokio::test]
    async fn test_no_work_on_empty_mempool() {
        let chain = Arc::new(RwLock::new(Blockchain::new(ChainConfig {
            difficulty: 2,
            ..ChainConfig::default()
        })));
        let miner = Miner::new(chain, "miner", &quick_config());
        assert_eq!(miner.mine_once().await.unwrap(), MinerStep::NoWork);
    }

    #[tokio::test]
    async fn test_mine_once_extends_chain() {
        let chain = chain_with_pending_tx(4);
        let miner = Miner::new(chain.clone(), "miner", &quick_config());

        let step = miner.mine_once().await.unwrap();
        assert!(matches!(step, MinerStep::Accepted(ref block) if block.index == 1));

        let chain = chain.read().await;
        assert_eq!(chain.height(), 2);
        assert!(chain.mempool().is_empty());
        assert!(chain.is_valid().is_ok());
        assert_eq!(chain.wallet("miner").balance, crate::economics::reward_for_difficulty(4));
    }

    /// Serves one hard template while reporting that the chain already moved on.
    struct MovedOn;

    impl WorkSource for MovedOn {
        async fn next_block(&self) -> Result<Option<BlockInfo>> {
            Ok(Some(BlockInfo {
                index: 1,
                previous_hash: "00".repeat(32),
                difficulty: 255,
                fee_per_tx: 0,
                transactions: vec![],
            }))
        }

        async fn submit_block(&self, _block: Block) -> Result<()> {
            Err(ChainError::Rejected("should not be called".into()))
        }

        async fn tip(&self) -> Result<u64> {
            Ok(2)
        }
    }

    /// Hands out trivial templates and refuses every solution.
    #[derive(Default)]
    struct AlwaysRejects {
        submissions: std::sync::Mutex<Vec<Instant>>,
    }

    impl WorkSource for Arc<AlwaysRejects> {
        async fn next_block(&self) -> Result<Option<BlockInfo>> {
            Ok(Some(BlockInfo {
                index: 1,
                previous_hash: "00".repeat(32),
                difficulty: 0,
                fee_per_tx: 0,
                transactions: vec![],
            }))
        }

        async fn submit_block(&self, _block: Block) -> Result<()> {
            self.submissions.lock().unwrap().push(Instant::now());
            Err(ChainError::Rejected("Block index mismatch".into()))
        }

        async fn tip(&self) -> Result<u64> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_rejected_blocks_back_off() {
        let source = Arc::new(AlwaysRejects::default());
        let config = quick_config();
        let miner = Miner::new(source.clone(), "miner", &config);

        let window = Duration::from_millis(300);
        assert!(tokio::time::timeout(window, miner.run()).await.is_err());

        // Waits of 10, 20, 40, 80 and 160ms leave room for at most six rounds.
        let submissions = source.submissions.lock().unwrap().clone();
        assert!(
            (3..=6).contains(&submissions.len()),
            "{} submissions in {:?}",
            submissions.len(),
            window
        );
        let mut expected = config.poll_interval;
        for pair in submissions.windows(2) {
            assert!(pair[1] - pair[0] >= expected);
            expected *= 2;
        }
    }

    #[tokio::test]
    async fn test_superseded_template_is_abandoned() {
        let miner = Miner::new(MovedOn, "miner", &quick_config());
        assert_eq!(miner.mine_once().await.unwrap(), MinerStep::Superseded(1));
    }

    #[tokio::test]
    async fn test_stale_block_refused_after_competitor() {
        let chain = chain_with_pending_tx(2);
        let miner = Miner::new(chain.clone(), "miner", &quick_config());

        // Solve a template, then let a competing block land first.
        let stale = chain.read().await.next_block().unwrap();
        let competitor = {
            let mut block = Block::from_block_info(&stale, "rival");
            block.mine(stale.difficulty, "rival", &AtomicBool::new(false));
            block
        };
        let mut late = Block::from_block_info(&stale, "miner");
        late.mine(stale.difficulty, "miner", &AtomicBool::new(false));

        chain.submit_block(competitor).await.unwrap();
        let err = chain.submit_block(late).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidBlock(_)));
        assert_eq!(miner.mine_once().await.unwrap(), MinerStep::NoWork);
    }
}
