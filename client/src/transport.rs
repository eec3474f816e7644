//! RPC endpoints for individual block servers.

use std::{
    io::{self, BufReader, BufWriter},
    net::{SocketAddr, TcpStream},
    time::Duration,
};

use log::debug;
use stripefs_proto::{ProtoError, Request, Response};

/// Per-request socket timeout. A timed-out request is retried, not treated
/// as data loss.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server is up but slow; the caller should back off and retry.
    #[error("request timed out")]
    TimedOut,
    /// Connection refused, reset, or dropped: the server is gone and reads
    /// must fall back to reconstruction.
    #[error("server unavailable: {0}")]
    Unavailable(String),
    /// The server answered, but not with anything the protocol allows.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// One block server, as seen from a client.
///
/// Implementations retry nothing themselves; the striped store owns the
/// retry and reconstruction policy.
pub trait BlockTransport {
    fn get(&mut self, index: u32) -> Result<Vec<u8>, TransportError>;
    fn put(&mut self, index: u32, data: &[u8]) -> Result<(), TransportError>;
    fn rsm(&mut self, index: u32) -> Result<Vec<u8>, TransportError>;
}

/// A lazily connected TCP endpoint. Any error tears the connection down so
/// the next call starts from a fresh connect.
pub struct TcpTransport {
    addr: SocketAddr,
    block_size: usize,
    timeout: Duration,
    stream: Option<(BufReader<TcpStream>, BufWriter<TcpStream>)>,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr, block_size: usize) -> Self {
        Self {
            addr,
            block_size,
            timeout: SOCKET_TIMEOUT,
            stream: None,
        }
    }

    fn connect(
        &mut self,
    ) -> Result<&mut (BufReader<TcpStream>, BufWriter<TcpStream>), TransportError> {
        if self.stream.is_none() {
            debug!("connecting to {}", self.addr);
            let stream =
                TcpStream::connect_timeout(&self.addr, self.timeout).map_err(map_io_error)?;
            stream
                .set_read_timeout(Some(self.timeout))
                .map_err(map_io_error)?;
            stream
                .set_write_timeout(Some(self.timeout))
                .map_err(map_io_error)?;
            let reader = BufReader::new(stream.try_clone().map_err(map_io_error)?);
            self.stream = Some((reader, BufWriter::new(stream)));
        }
        Ok(self.stream.as_mut().unwrap())
    }

    fn call(&mut self, req: &Request) -> Result<Vec<u8>, TransportError> {
        let block_size = self.block_size;
        let res = (|| {
            let (reader, writer) = self.connect()?;
            req.write_to(writer).map_err(map_io_error)?;
            match Response::read_from(reader, block_size) {
                Ok(Response::Ok(data)) => Ok(data),
                Ok(Response::Failed) => {
                    Err(TransportError::Protocol("server refused request".into()))
                }
                Err(ProtoError::Io(e)) => Err(map_io_error(e)),
                Err(e) => Err(TransportError::Protocol(e.to_string())),
            }
        })();
        if res.is_err() {
            // drop the connection; a retry reconnects from scratch
            self.stream = None;
        }
        res
    }
}

fn map_io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::TimedOut,
        _ => TransportError::Unavailable(e.to_string()),
    }
}

impl TcpTransport {
    /// Get and Rsm replies must carry exactly one block.
    fn expect_block(&self, data: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if data.len() == self.block_size {
            Ok(data)
        } else {
            Err(TransportError::Protocol(format!(
                "expected {} block bytes, got {}",
                self.block_size,
                data.len()
            )))
        }
    }
}

impl BlockTransport for TcpTransport {
    fn get(&mut self, index: u32) -> Result<Vec<u8>, TransportError> {
        let data = self.call(&Request::Get { index })?;
        self.expect_block(data)
    }

    fn put(&mut self, index: u32, data: &[u8]) -> Result<(), TransportError> {
        self.call(&Request::Put {
            index,
            data: data.to_vec(),
        })
        .map(|_| ())
    }

    fn rsm(&mut self, index: u32) -> Result<Vec<u8>, TransportError> {
        let data = self.call(&Request::Rsm { index })?;
        self.expect_block(data)
    }
}

pub mod memory {
    //! An in-process block server, shared by cloning.
    //!
    //! This is the backend the test suites run against: several clients can
    //! hold transports onto the same server, a server can be killed and
    //! revived to exercise reconstruction and repair, and the raw slots can
    //! be inspected to check the parity invariant.

    use std::sync::{Arc, Mutex};

    use super::{BlockTransport, TransportError};

    struct State {
        blocks: Vec<Vec<u8>>,
        alive: bool,
        gets: usize,
        puts: usize,
    }

    #[derive(Clone)]
    pub struct MemoryServer {
        block_size: usize,
        state: Arc<Mutex<State>>,
    }

    impl MemoryServer {
        pub fn new(num_blocks: usize, block_size: usize) -> Self {
            Self {
                block_size,
                state: Arc::new(Mutex::new(State {
                    blocks: vec![vec![0; block_size]; num_blocks],
                    alive: true,
                    gets: 0,
                    puts: 0,
                })),
            }
        }

        /// Makes every subsequent request fail as unavailable.
        pub fn kill(&self) {
            self.state.lock().unwrap().alive = false;
        }

        pub fn revive(&self) {
            self.state.lock().unwrap().alive = true;
        }

        /// Raw slot contents, bypassing the transport.
        pub fn raw_block(&self, index: usize) -> Vec<u8> {
            self.state.lock().unwrap().blocks[index].clone()
        }

        pub fn num_blocks(&self) -> usize {
            self.state.lock().unwrap().blocks.len()
        }

        pub fn get_count(&self) -> usize {
            self.state.lock().unwrap().gets
        }

        pub fn put_count(&self) -> usize {
            self.state.lock().unwrap().puts
        }

        fn check_alive(state: &State) -> Result<(), TransportError> {
            if state.alive {
                Ok(())
            } else {
                Err(TransportError::Unavailable("server killed".into()))
            }
        }
    }

    impl BlockTransport for MemoryServer {
        fn get(&mut self, index: u32) -> Result<Vec<u8>, TransportError> {
            let mut state = self.state.lock().unwrap();
            Self::check_alive(&state)?;
            state.gets += 1;
            Ok(state.blocks[index as usize].clone())
        }

        fn put(&mut self, index: u32, data: &[u8]) -> Result<(), TransportError> {
            assert!(data.len() <= self.block_size);
            let mut state = self.state.lock().unwrap();
            Self::check_alive(&state)?;
            state.puts += 1;
            let block = &mut state.blocks[index as usize];
            block[..data.len()].copy_from_slice(data);
            block[data.len()..].fill(0);
            Ok(())
        }

        fn rsm(&mut self, index: u32) -> Result<Vec<u8>, TransportError> {
            let block_size = self.block_size;
            let mut state = self.state.lock().unwrap();
            Self::check_alive(&state)?;
            let block = &mut state.blocks[index as usize];
            Ok(std::mem::replace(block, vec![0xff; block_size]))
        }
    }
}
