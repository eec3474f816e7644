use std::{thread, time::Duration};

use log::{debug, warn};
use stripefs_proto::{Request, Response};

/// How long an injected delay stalls the server. Long enough to trip the
/// clients' socket timeout and exercise their retry path.
const DELAY: Duration = Duration::from_secs(10);

/// The raw slot array one block server exports.
///
/// Slots are addressed by per-server index; the server knows nothing about
/// striping, parity, or the logical block space.
pub struct BlockArray {
    block_size: usize,
    blocks: Vec<Vec<u8>>,
    requests: u64,
    delay_every: Option<u64>,
}

impl BlockArray {
    pub fn new(num_blocks: usize, block_size: usize, delay_every: Option<u64>) -> Self {
        Self {
            block_size,
            blocks: vec![vec![0; block_size]; num_blocks],
            requests: 0,
            delay_every: delay_every.filter(|&n| n > 0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Answers one request. Out-of-range indices and oversized payloads get
    /// a failure response rather than killing the server.
    pub fn handle(&mut self, req: &Request) -> Response {
        self.count_request();
        match *req {
            Request::Get { index } => match self.blocks.get(index as usize) {
                Some(block) => Response::Ok(block.clone()),
                None => self.out_of_range(index),
            },
            Request::Put { index, ref data } => {
                if data.len() > self.block_size {
                    warn!("put {index}: payload of {} bytes refused", data.len());
                    return Response::Failed;
                }
                match self.blocks.get_mut(index as usize) {
                    Some(block) => {
                        block[..data.len()].copy_from_slice(data);
                        block[data.len()..].fill(0);
                        Response::Ok(Vec::new())
                    }
                    None => self.out_of_range(index),
                }
            }
            Request::Rsm { index } => match self.blocks.get_mut(index as usize) {
                // Test-and-set: hand back the prior contents, leave the
                // slot all-ones.
                Some(block) => {
                    let prior = std::mem::replace(block, vec![0xff; self.block_size]);
                    Response::Ok(prior)
                }
                None => self.out_of_range(index),
            },
        }
    }

    fn out_of_range(&self, index: u32) -> Response {
        warn!("slot {index} out of range (have {})", self.blocks.len());
        Response::Failed
    }

    fn count_request(&mut self) {
        self.requests += 1;
        if let Some(every) = self.delay_every
            && self.requests % every == 0
        {
            debug!("request {}: injecting {DELAY:?} delay", self.requests);
            thread::sleep(DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array() -> BlockArray {
        BlockArray::new(4, 16, None)
    }

    #[test]
    fn get_returns_zeroed_slot() {
        let mut a = array();
        assert_eq!(
            a.handle(&Request::Get { index: 0 }),
            Response::Ok(vec![0; 16])
        );
    }

    #[test]
    fn put_pads_to_block_size() {
        let mut a = array();
        a.handle(&Request::Put {
            index: 1,
            data: b"abc".to_vec(),
        });
        let Response::Ok(block) = a.handle(&Request::Get { index: 1 }) else {
            panic!("get failed");
        };
        assert_eq!(&block[..3], b"abc");
        assert!(block[3..].iter().all(|&b| b == 0));
        assert_eq!(block.len(), 16);
    }

    #[test]
    fn put_overwrites_stale_tail() {
        let mut a = array();
        a.handle(&Request::Put {
            index: 1,
            data: vec![0xaa; 16],
        });
        a.handle(&Request::Put {
            index: 1,
            data: b"x".to_vec(),
        });
        let Response::Ok(block) = a.handle(&Request::Get { index: 1 }) else {
            panic!("get failed");
        };
        assert_eq!(block[0], b'x');
        assert!(block[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rsm_returns_prior_and_fills_ones() {
        let mut a = array();
        assert_eq!(
            a.handle(&Request::Rsm { index: 3 }),
            Response::Ok(vec![0; 16])
        );
        // second caller sees the lock taken
        assert_eq!(
            a.handle(&Request::Rsm { index: 3 }),
            Response::Ok(vec![0xff; 16])
        );
        // a put of zeroes releases
        a.handle(&Request::Put {
            index: 3,
            data: Vec::new(),
        });
        assert_eq!(
            a.handle(&Request::Rsm { index: 3 }),
            Response::Ok(vec![0; 16])
        );
    }

    #[test]
    fn out_of_range_fails_without_panic() {
        let mut a = array();
        assert_eq!(a.handle(&Request::Get { index: 4 }), Response::Failed);
        assert_eq!(
            a.handle(&Request::Put {
                index: 9,
                data: Vec::new()
            }),
            Response::Failed
        );
    }
}
