//! The stripefs block server: a remote array of raw block slots with an
//! atomic test-and-set, one process per server. Run `n_servers` of these on
//! consecutive ports and point the shell at the first port.

use std::{
    env,
    io::{self, BufReader, BufWriter},
    net::{TcpListener, TcpStream},
    process,
    sync::{Arc, Mutex},
    thread,
};

use anyhow::Context as _;
use log::{info, warn};
use stripefs_proto::{ProtoError, Request, Response};
use stripefs_types::FsConfig;

use self::block_array::BlockArray;

mod block_array;

fn usage() -> ! {
    let arg0 = env::args().next().unwrap();
    eprintln!(
        "Usage: {arg0} --port <port> [--num-blocks <n>] [--block-size <n>] [--delay-at <n>]"
    );
    process::exit(1);
}

struct Args {
    port: u16,
    num_blocks: usize,
    block_size: usize,
    delay_at: Option<u64>,
}

impl Args {
    fn parse() -> Self {
        let defaults = FsConfig::default();
        let mut port = None;
        let mut num_blocks = defaults.blocks_per_server();
        let mut block_size = defaults.block_size;
        let mut delay_at = None;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = || args.next().unwrap_or_else(|| usage());
            match arg.as_str() {
                "--port" => port = value().parse().ok(),
                "--num-blocks" => num_blocks = value().parse().unwrap_or_else(|_| usage()),
                "--block-size" => block_size = value().parse().unwrap_or_else(|_| usage()),
                "--delay-at" => delay_at = value().parse().ok(),
                _ => usage(),
            }
        }

        let Some(port) = port else { usage() };
        if num_blocks == 0 || block_size == 0 {
            usage();
        }
        Self {
            port,
            num_blocks,
            block_size,
            delay_at,
        }
    }
}

fn serve_client(blocks: &Mutex<BlockArray>, stream: TcpStream) -> Result<(), ProtoError> {
    let peer = stream.peer_addr().ok();
    let mut reader = BufReader::new(stream.try_clone().map_err(ProtoError::Io)?);
    let mut writer = BufWriter::new(stream);

    loop {
        let block_size = blocks.lock().unwrap().block_size();
        let req = match Request::read_from(&mut reader, block_size) {
            Ok(req) => req,
            Err(ProtoError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("client {peer:?} disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        // One request at a time across all connections; RSM atomicity
        // depends on this serialization.
        let resp = blocks.lock().unwrap().handle(&req);
        resp.write_to(&mut writer)?;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let listener = TcpListener::bind(("127.0.0.1", args.port))
        .with_context(|| format!("cannot listen on port {}", args.port))?;
    info!(
        "serving {} blocks of {} bytes on port {}",
        args.num_blocks, args.block_size, args.port
    );

    let blocks = Arc::new(Mutex::new(BlockArray::new(
        args.num_blocks,
        args.block_size,
        args.delay_at,
    )));

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };
        let blocks = Arc::clone(&blocks);
        thread::spawn(move || {
            if let Err(e) = serve_client(&blocks, stream) {
                warn!("connection error: {e}");
            }
        });
    }
    Ok(())
}
