//! The striped block store.
//!
//! Exposes `get`/`put`/`rsm` over the logical block space
//! `0..cfg.total_blocks`, hiding striping, parity, caching and single-server
//! failure behind it. Blocks are grouped into stripes of `n_servers - 1`
//! data blocks plus one parity block; the parity position rotates across
//! stripe levels so no single server accumulates the parity load. Both a
//! logical block and its stripe's parity live at the same raw slot (the
//! stripe level) on their respective servers.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufReader, BufWriter, Read as _, Write as _},
    path::Path,
    thread,
    time::Duration,
};

use log::{debug, info, warn};
use stripefs_types::{BlockNo, FsConfig, MAX_CLIENTS};

use crate::transport::{BlockTransport, TransportError};

/// Back-off between retries of a timed-out request.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("dump geometry tag `{found}` does not match this file system (`{expected}`)")]
    TagMismatch { expected: String, found: String },
}

/// Where a logical block lives: its stripe level (the raw slot index on
/// every server of the stripe) and the servers holding its data and parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stripe {
    level: u32,
    data_server: usize,
    /// `None` in the degenerate single-server configuration.
    parity_server: Option<usize>,
}

/// A client's view of the striped block space.
///
/// Owns the write-through cache (keyed by logical block number), the
/// last-writer stamping that drives cross-client cache invalidation, and
/// the acquire/release spinlock every shell command wraps itself in.
pub struct BlockClient<T> {
    cfg: FsConfig,
    client_id: u8,
    servers: Vec<T>,
    cache: HashMap<BlockNo, Vec<u8>>,
}

impl<T: BlockTransport> BlockClient<T> {
    /// # Panics
    ///
    /// Panics if the server list does not match the configured server count
    /// or the client id is out of range; both are start-up configuration
    /// mistakes.
    pub fn new(cfg: FsConfig, client_id: u8, servers: Vec<T>) -> Self {
        assert_eq!(servers.len(), cfg.n_servers, "one transport per server");
        assert!(client_id < MAX_CLIENTS, "client id out of range");
        Self {
            cfg,
            client_id,
            servers,
            cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.cfg
    }

    pub fn client_id(&self) -> u8 {
        self.client_id
    }

    fn stripe(&self, b: BlockNo) -> Stripe {
        let n = self.cfg.n_servers;
        if n == 1 {
            return Stripe {
                level: b.value(),
                data_server: 0,
                parity_server: None,
            };
        }
        let data_positions = (n - 1) as u32;
        let level = b.value() / data_positions;
        let parity_server = (level as usize) % n;
        let mut data_server = (b.value() % data_positions) as usize;
        if data_server >= parity_server {
            data_server += 1;
        }
        Stripe {
            level,
            data_server,
            parity_server: Some(parity_server),
        }
    }

    fn check_range(&self, b: BlockNo) {
        assert!(
            b.as_index() < self.cfg.total_blocks,
            "block number {b} out of range"
        );
    }

    /// Reads the raw slot `level` from `server`, retrying timeouts forever
    /// and falling back to reconstruction when the server is gone.
    fn fetch_raw(&mut self, server: usize, level: u32) -> Vec<u8> {
        loop {
            match self.servers[server].get(level) {
                Ok(data) => return data,
                Err(TransportError::TimedOut) => {
                    warn!("server {server} timed out; retrying in {RETRY_INTERVAL:?}");
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => {
                    warn!("server {server} down ({e}); reconstructing level {level}");
                    return self.reconstruct(server, level);
                }
            }
        }
    }

    /// Recovers the slot a failed server holds at `level` by XOR-ing the
    /// same level on every other server.
    ///
    /// # Panics
    ///
    /// Panics if a second server is also unavailable; surviving more than
    /// one failure is out of scope.
    fn reconstruct(&mut self, failed: usize, level: u32) -> Vec<u8> {
        assert!(self.cfg.n_servers > 1, "cannot reconstruct without parity");
        let mut data = vec![0; self.cfg.block_size];
        for server in 0..self.cfg.n_servers {
            if server == failed {
                continue;
            }
            let peer = loop {
                match self.servers[server].get(level) {
                    Ok(data) => break data,
                    Err(TransportError::TimedOut) => {
                        warn!("server {server} timed out; retrying in {RETRY_INTERVAL:?}");
                        thread::sleep(RETRY_INTERVAL);
                    }
                    Err(e) => panic!(
                        "servers {failed} and {server} both unavailable ({e}); \
                         cannot reconstruct level {level}"
                    ),
                }
            };
            xor_into(&mut data, &peer);
        }
        data
    }

    /// Writes a raw slot, retrying timeouts. Returns `false` when the
    /// server is unreachable: the write is skipped and the stripe stays
    /// degraded until [`BlockClient::repair`] runs.
    fn put_raw(&mut self, server: usize, level: u32, data: &[u8]) -> bool {
        loop {
            match self.servers[server].put(level, data) {
                Ok(()) => return true,
                Err(TransportError::TimedOut) => {
                    warn!("server {server} timed out; retrying in {RETRY_INTERVAL:?}");
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => {
                    warn!("server {server} down ({e}); level {level} degraded until repair");
                    return false;
                }
            }
        }
    }

    /// Reads the logical block `b`.
    ///
    /// Cache hits are served locally; the last-writer and lock blocks
    /// always go to the server. A missing server is healed on the fly by
    /// reconstruction.
    pub fn get(&mut self, b: BlockNo) -> Vec<u8> {
        self.check_range(b);
        let reserved = self.cfg.is_reserved(b);
        if !reserved && let Some(cached) = self.cache.get(&b) {
            debug!("cache hit for block {b}");
            return cached.clone();
        }
        let stripe = self.stripe(b);
        let data = self.fetch_raw(stripe.data_server, stripe.level);
        if !reserved {
            debug!("cache miss for block {b}");
            self.cache.insert(b, data.clone());
        }
        data
    }

    /// Writes the logical block `b`, padding short data with NUL.
    ///
    /// Updates the cache write-through, sends the block to its data server,
    /// folds the change into the stripe's parity
    /// (`parity' = parity ^ old ^ new`), and finally stamps this client's
    /// id into the last-writer block. Writes to the last-writer and lock
    /// blocks themselves never disturb the stamp.
    pub fn put(&mut self, b: BlockNo, data: &[u8]) {
        self.check_range(b);
        assert!(
            data.len() <= self.cfg.block_size,
            "block larger than block size: {}",
            data.len()
        );
        let mut new = data.to_vec();
        new.resize(self.cfg.block_size, 0);

        let stripe = self.stripe(b);
        let reserved = self.cfg.is_reserved(b);

        // Prior contents, needed for the parity delta. The cache is
        // authoritative for anything it holds. The lock block is special:
        // the RSM scribble is never folded into parity, so the delta
        // baseline for that slot is always the released (all-zero) state.
        let old = stripe.parity_server.map(|_| {
            if b == self.cfg.lock_block() {
                vec![0; self.cfg.block_size]
            } else if let Some(cached) = self.cache.get(&b) {
                cached.clone()
            } else {
                self.fetch_raw(stripe.data_server, stripe.level)
            }
        });

        if !reserved {
            debug!("cache write-through for block {b}");
            self.cache.insert(b, new.clone());
        }

        self.put_raw(stripe.data_server, stripe.level, &new);

        if let Some(parity_server) = stripe.parity_server {
            let mut parity = self.fetch_raw(parity_server, stripe.level);
            xor_into(&mut parity, &old.unwrap());
            xor_into(&mut parity, &new);
            self.put_raw(parity_server, stripe.level, &parity);
        }

        if !reserved {
            let stamp = [self.client_id];
            self.put(self.cfg.last_writer_block(), &stamp);
        }
    }

    /// The remote test-and-set, used only on the lock block. Never cached;
    /// retried until the server answers (a lock cannot be reconstructed
    /// from parity).
    pub fn rsm(&mut self, b: BlockNo) -> Vec<u8> {
        self.check_range(b);
        let stripe = self.stripe(b);
        loop {
            match self.servers[stripe.data_server].rsm(stripe.level) {
                Ok(prior) => return prior,
                Err(e) => {
                    warn!(
                        "rsm on server {} failed ({e}); retrying in {RETRY_INTERVAL:?}",
                        stripe.data_server
                    );
                    thread::sleep(RETRY_INTERVAL);
                }
            }
        }
    }

    /// Enters the cross-client critical section.
    ///
    /// Spins on the remote test-and-set until this client wins the lock,
    /// then validates the cache: if some other client wrote since we last
    /// held the lock, every cache entry is dropped and the last-writer
    /// stamp is taken over.
    pub fn acquire(&mut self) {
        let lock = self.cfg.lock_block();
        loop {
            let prior = self.rsm(lock);
            if prior[0] == 0 {
                break;
            }
        }

        let last_writer = self.get(self.cfg.last_writer_block());
        if last_writer[0] != self.client_id {
            info!(
                "cache invalidated: last writer was client {}",
                last_writer[0]
            );
            self.cache.clear();
            let stamp = [self.client_id];
            self.put(self.cfg.last_writer_block(), &stamp);
        }
    }

    /// Leaves the critical section by zeroing the lock block. Goes through
    /// the normal write-through and parity path, but the reserved-block
    /// special case keeps it from touching the last-writer stamp; a
    /// release must not invalidate every other client's cache.
    pub fn release(&mut self) {
        self.put(self.cfg.lock_block(), &[]);
    }

    /// Rebuilds every slot of a replaced server from the rest of its
    /// stripes. Never invoked automatically.
    pub fn repair(&mut self, failed: usize) {
        assert!(failed < self.cfg.n_servers, "no such server: {failed}");
        if self.cfg.n_servers == 1 {
            warn!("nothing to repair without parity");
            return;
        }
        info!("repairing server {failed}");
        for level in 0..self.cfg.blocks_per_server() as u32 {
            let data = self.reconstruct(failed, level);
            self.put_raw(failed, level, &data);
        }
    }

    /// Serializes the whole logical block space to `path`, preceded by the
    /// geometry tag.
    pub fn save_dump(&mut self, path: &Path) -> Result<(), DumpError> {
        info!("saving {} blocks to {}", self.cfg.total_blocks, path.display());
        let mut file = BufWriter::new(File::create(path)?);
        let tag = self.cfg.dump_tag();
        file.write_all(&u32::try_from(tag.len()).unwrap().to_be_bytes())?;
        file.write_all(tag.as_bytes())?;
        for b in 0..self.cfg.total_blocks {
            let block = self.get(BlockNo::new(b as u32));
            file.write_all(&block)?;
        }
        file.flush()?;
        Ok(())
    }

    /// Replays a dump through `put`, so striping, parity and the cache all
    /// see the restored blocks. Refuses a dump whose geometry tag differs.
    pub fn load_dump(&mut self, path: &Path) -> Result<(), DumpError> {
        info!("loading blocks from {}", path.display());
        let mut file = BufReader::new(File::open(path)?);

        let mut len = [0; 4];
        file.read_exact(&mut len)?;
        let mut found = vec![0; u32::from_be_bytes(len) as usize];
        file.read_exact(&mut found)?;
        let found = String::from_utf8_lossy(&found).into_owned();
        let expected = self.cfg.dump_tag();
        if found != expected {
            return Err(DumpError::TagMismatch { expected, found });
        }

        let mut block = vec![0; self.cfg.block_size];
        for b in 0..self.cfg.total_blocks {
            file.read_exact(&mut block)?;
            let b = BlockNo::new(b as u32);
            // the lock state and writer stamp are live, not restorable
            if self.cfg.is_reserved(b) {
                continue;
            }
            self.put(b, &block);
        }
        Ok(())
    }
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
