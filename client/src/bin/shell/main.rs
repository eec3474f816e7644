//! The interactive stripefs shell: a thin read-eval-print driver over the
//! client library. Every command that touches the block space runs inside
//! the cross-client critical section, so remote peers always observe the
//! metadata invariants, never a half-applied update.

use std::{
    env,
    io::{self, BufRead as _, Write as _},
    net::{SocketAddr, ToSocketAddrs as _},
    path::Path,
    process,
};

use anyhow::Context as _;
use stripefs_client::{BlockClient, DumpError, FileSystem, TcpTransport};
use stripefs_types::{BlockNo, FsConfig, InodeNo, InodeType, MAX_CLIENTS, MAX_FILENAME};

fn usage() -> ! {
    let arg0 = env::args().next().unwrap();
    eprintln!(
        "Usage: {arg0} [--client-id <0..{MAX_CLIENTS}>] [--server-address <host>] \
         [--start-port <port>] [--num-servers <n>] [--total-blocks <n>] \
         [--block-size <n>] [--max-inodes <n>] [--inode-size <n>]"
    );
    process::exit(1);
}

struct Args {
    client_id: u8,
    server_address: String,
    start_port: u16,
    total_blocks: usize,
    block_size: usize,
    max_inodes: usize,
    inode_size: usize,
    n_servers: usize,
}

impl Args {
    fn parse() -> Self {
        let defaults = FsConfig::default();
        let mut parsed = Self {
            client_id: 0,
            server_address: "127.0.0.1".into(),
            start_port: 8000,
            total_blocks: defaults.total_blocks,
            block_size: defaults.block_size,
            max_inodes: defaults.max_inodes,
            inode_size: defaults.inode_size,
            n_servers: defaults.n_servers,
        };

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = || args.next().unwrap_or_else(|| usage());
            match arg.as_str() {
                "--client-id" => parsed.client_id = value().parse().unwrap_or_else(|_| usage()),
                "--server-address" => parsed.server_address = value(),
                "--start-port" => parsed.start_port = value().parse().unwrap_or_else(|_| usage()),
                "--total-blocks" => parsed.total_blocks = value().parse().unwrap_or_else(|_| usage()),
                "--block-size" => parsed.block_size = value().parse().unwrap_or_else(|_| usage()),
                "--max-inodes" => parsed.max_inodes = value().parse().unwrap_or_else(|_| usage()),
                "--inode-size" => parsed.inode_size = value().parse().unwrap_or_else(|_| usage()),
                "--num-servers" => parsed.n_servers = value().parse().unwrap_or_else(|_| usage()),
                _ => usage(),
            }
        }
        if parsed.client_id >= MAX_CLIENTS {
            eprintln!("client id must be below {MAX_CLIENTS}");
            process::exit(1);
        }
        parsed
    }
}

fn server_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("no address for {host}:{port}"))
}

struct Shell {
    fs: FileSystem<TcpTransport>,
    cwd: InodeNo,
}

impl Shell {
    /// Brackets a command body with acquire/release; the lock is dropped
    /// on every exit path.
    fn with_lock<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.fs.acquire();
        let result = f(self);
        self.fs.release();
        result
    }

    fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("[cwd={}]% ", self.cwd.value());
            io::stdout().flush()?;
            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                return Ok(());
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let Some((&cmd, args)) = words.split_first() else {
                continue;
            };
            match (cmd, args) {
                ("cd", [path]) => self.cd(path),
                ("ls", []) => self.ls(),
                ("cat", [path]) => self.cat(path),
                ("mkdir", [name]) => self.create(name, InodeType::Dir),
                ("create", [name]) => self.create(name, InodeType::File),
                ("append", [path, text]) => self.append(path, text),
                ("slice", [path, offset, count]) => self.slice(path, offset, count),
                ("mirror", [path]) => self.mirror(path),
                ("rm", [name]) => self.rm(name),
                ("lnh", [target, name]) => self.link(target, name, false),
                ("lns", [target, name]) => self.link(target, name, true),
                ("repair", [server]) => self.repair(server),
                ("showblock", [n]) => self.show_block(n),
                ("showblockslice", [n, start, end]) => self.show_block_slice(n, start, end),
                ("showinode", [n]) => self.show_inode(n),
                ("showfsconfig", []) => self.show_fs_config(),
                ("load", [path]) => self.load(path),
                ("save", [path]) => self.save(path),
                ("exit", []) => return Ok(()),
                ("cd" | "cat" | "mkdir" | "create" | "mirror" | "rm" | "showblock"
                | "showinode" | "load" | "save" | "repair", _) => {
                    println!("Error: {cmd} requires one argument");
                }
                ("append" | "lnh" | "lns", _) => {
                    println!("Error: {cmd} requires two arguments");
                }
                ("slice" | "showblockslice", _) => {
                    println!("Error: {cmd} requires three arguments");
                }
                ("ls" | "showfsconfig" | "exit", _) => {
                    println!("Error: {cmd} takes no arguments");
                }
                _ => println!("command {cmd} not valid."),
            }
        }
    }

    /// Resolves `path` (following symlinks) and requires the named inode
    /// type, printing the shell's usual complaints otherwise.
    fn resolve_as(&mut self, path: &str, ty: InodeType) -> Option<InodeNo> {
        let Some(n) = self.fs.resolve_path(path, self.cwd) else {
            println!("Error: not found");
            return None;
        };
        if self.fs.load_inode(n).ty != ty {
            match ty {
                InodeType::Dir => println!("Error: not a directory"),
                _ => println!("Error: not a file"),
            }
            return None;
        }
        Some(n)
    }

    fn check_name(name: &str) -> bool {
        if name.len() > MAX_FILENAME {
            println!("Error: file name exceeds {MAX_FILENAME} characters");
            return false;
        }
        true
    }

    fn parse_int<T: std::str::FromStr>(text: &str) -> Option<T> {
        let parsed = text.parse().ok();
        if parsed.is_none() {
            println!("Error: {text} not a valid integer");
        }
        parsed
    }

    fn cd(&mut self, path: &str) {
        self.with_lock(|sh| {
            if let Some(n) = sh.resolve_as(path, InodeType::Dir) {
                sh.cwd = n;
            }
        });
    }

    fn ls(&mut self) {
        self.with_lock(|sh| {
            let entries = sh.fs.list_dir(sh.cwd).unwrap_or_default();
            for (name, n) in entries {
                let inode = sh.fs.load_inode(n);
                match inode.ty {
                    InodeType::Dir => println!("[{}]:{name}/", inode.refcnt),
                    InodeType::Sym => {
                        let target = sh.fs.symlink_target(n).unwrap_or_default();
                        println!("[{}]:{name}@ -> {target}", inode.refcnt);
                    }
                    _ => println!("[{}]:{name}", inode.refcnt),
                }
            }
        });
    }

    fn cat(&mut self, path: &str) {
        self.with_lock(|sh| {
            let Some(n) = sh.resolve_as(path, InodeType::File) else {
                return;
            };
            let max = sh.fs.config().max_file_size();
            match sh.fs.read(n, 0, max) {
                Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
                Err(e) => println!("Error: {}", e.symbol()),
            }
        });
    }

    fn create(&mut self, name: &str, ty: InodeType) {
        if !Self::check_name(name) {
            return;
        }
        self.with_lock(|sh| {
            if let Err(e) = sh.fs.create(sh.cwd, name, ty) {
                println!("Error: {}", e.symbol());
            }
        });
    }

    fn append(&mut self, path: &str, text: &str) {
        self.with_lock(|sh| {
            let Some(n) = sh.resolve_as(path, InodeType::File) else {
                return;
            };
            let offset = sh.fs.load_inode(n).size as usize;
            match sh.fs.write(n, offset, text.as_bytes()) {
                Ok(written) => println!("Successfully appended {written} bytes."),
                Err(e) => println!("Error: {}", e.symbol()),
            }
        });
    }

    fn slice(&mut self, path: &str, offset: &str, count: &str) {
        let Some(offset) = Self::parse_int::<i64>(offset) else {
            return;
        };
        let Some(count) = Self::parse_int::<i64>(count) else {
            return;
        };
        self.with_lock(|sh| {
            let Some(n) = sh.resolve_as(path, InodeType::File) else {
                return;
            };
            if offset < 0 {
                println!("Error: ERROR_SLICE_OFFSET_OUT_BOUNDS");
                return;
            }
            if count < 0 {
                println!("Error: ERROR_SLICE_COUNT_OUT_BOUNDS");
                return;
            }
            if let Err(e) = sh.fs.slice(n, offset as usize, count as usize) {
                println!("Error: {}", e.symbol());
            }
        });
    }

    fn mirror(&mut self, path: &str) {
        self.with_lock(|sh| {
            let Some(n) = sh.resolve_as(path, InodeType::File) else {
                return;
            };
            if let Err(e) = sh.fs.mirror(n) {
                println!("Error: {}", e.symbol());
            }
        });
    }

    fn rm(&mut self, name: &str) {
        self.with_lock(|sh| {
            if let Err(e) = sh.fs.unlink(sh.cwd, name) {
                println!("Error: {}", e.symbol());
            }
        });
    }

    fn link(&mut self, target: &str, name: &str, symbolic: bool) {
        if !Self::check_name(name) {
            return;
        }
        self.with_lock(|sh| {
            let result = if symbolic {
                sh.fs.symlink(target, name, sh.cwd)
            } else {
                sh.fs.link(target, name, sh.cwd)
            };
            if let Err(e) = result {
                println!("Error: {}", e.symbol());
            }
        });
    }

    fn repair(&mut self, server: &str) {
        let Some(server) = Self::parse_int::<usize>(server) else {
            return;
        };
        let n_servers = self.fs.config().n_servers;
        if server >= n_servers {
            println!("Error: server number {server} not in valid range [0, {}]", n_servers - 1);
            return;
        }
        self.with_lock(|sh| sh.fs.store().repair(server));
    }

    fn parse_block_number(&mut self, text: &str) -> Option<BlockNo> {
        let n = Self::parse_int::<usize>(text)?;
        let total = self.fs.config().total_blocks;
        if n >= total {
            println!("Error: block number {n} not in valid range [0, {}]", total - 1);
            return None;
        }
        Some(BlockNo::new(n as u32))
    }

    fn show_block(&mut self, n: &str) {
        let Some(b) = self.parse_block_number(n) else {
            return;
        };
        self.with_lock(|sh| {
            let block = sh.fs.store().get(b);
            println!(
                "Block (string snippets) [{b}]:\n{}",
                String::from_utf8_lossy(&block)
            );
            println!("Block (raw hex) [{b}]:\n{}", hex(&block));
        });
    }

    fn show_block_slice(&mut self, n: &str, start: &str, end: &str) {
        let Some(b) = self.parse_block_number(n) else {
            return;
        };
        let Some(start) = Self::parse_int::<usize>(start) else {
            return;
        };
        let Some(end) = Self::parse_int::<usize>(end) else {
            return;
        };
        let block_size = self.fs.config().block_size;
        if start >= block_size || end >= block_size || end <= start {
            println!("Error: slice bounds not in valid range [0, {}]", block_size - 1);
            return;
        }
        self.with_lock(|sh| {
            let block = sh.fs.store().get(b);
            println!("Block (raw hex) [{b}]:\n{}", hex(&block[start..=end]));
        });
    }

    fn show_inode(&mut self, n: &str) {
        let Some(n) = Self::parse_int::<usize>(n) else {
            return;
        };
        let max_inodes = self.fs.config().max_inodes;
        if n >= max_inodes {
            println!("Error: inode number {n} not in valid range [0, {}]", max_inodes - 1);
            return;
        }
        self.with_lock(|sh| {
            let inode = sh.fs.load_inode(InodeNo::new(n as u32));
            println!("Inode size   : {}", inode.size);
            println!("Inode type   : {:?}", inode.ty);
            println!("Inode refcnt : {}", inode.refcnt);
            let blocks: Vec<String> = inode
                .blocks
                .iter()
                .map(|b| b.map_or_else(|| "0".into(), |b| b.to_string()))
                .collect();
            println!("Block numbers: {}", blocks.join(","));
        });
    }

    fn show_fs_config(&mut self) {
        let cfg = self.fs.config();
        println!("#### File system information:");
        println!("Number of blocks          : {}", cfg.total_blocks);
        println!("Block size (Bytes)        : {}", cfg.block_size);
        println!("Number of inodes          : {}", cfg.max_inodes);
        println!("inode size (Bytes)        : {}", cfg.inode_size);
        println!("inodes per block          : {}", cfg.inodes_per_block());
        println!("Free bitmap offset        : {}", cfg.bitmap_block_offset());
        println!("Free bitmap size (blocks) : {}", cfg.bitmap_blocks());
        println!("Inode table offset        : {}", cfg.inode_block_offset());
        println!("Inode table size (blocks) : {}", cfg.inode_blocks());
        println!("Max blocks per file       : {}", cfg.max_blocks_per_file());
        println!("Data blocks offset        : {}", cfg.data_block_offset());
        println!("Number of servers         : {}", cfg.n_servers);
        println!("Raw blocks per server     : {}", cfg.blocks_per_server());
        println!("Layout: (B: boot, S: superblock, F: free bitmap, I: inode, D: data, W: last writer, L: lock)");
        let mut layout = String::from("BS");
        layout.extend(std::iter::repeat_n('F', cfg.bitmap_blocks()));
        layout.extend(std::iter::repeat_n('I', cfg.inode_blocks()));
        layout.extend(std::iter::repeat_n('D', cfg.total_blocks - cfg.data_block_offset() - 2));
        layout.push_str("WL");
        println!("{layout}");
    }

    fn load(&mut self, path: &str) {
        if !Path::new(path).is_file() {
            println!("Error: please provide a valid dump file");
            return;
        }
        let result = self.with_lock(|sh| sh.fs.store().load_dump(Path::new(path)));
        match result {
            Ok(()) => self.cwd = InodeNo::ROOT,
            Err(e @ DumpError::TagMismatch { .. }) => {
                // geometry mismatch corrupts everything it would restore
                eprintln!("fatal: {e}");
                process::exit(1);
            }
            Err(e) => println!("Error: {e}"),
        }
    }

    fn save(&mut self, path: &str) {
        if let Err(e) = self.with_lock(|sh| sh.fs.store().save_dump(Path::new(path))) {
            println!("Error: {e}");
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = FsConfig::new(
        args.total_blocks,
        args.block_size,
        args.max_inodes,
        args.inode_size,
        args.n_servers,
    )
    .context("invalid file system geometry")?;

    let transports = (0..cfg.n_servers)
        .map(|i| -> anyhow::Result<TcpTransport> {
            let addr = server_addr(&args.server_address, args.start_port + i as u16)?;
            Ok(TcpTransport::new(addr, cfg.block_size))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let store = BlockClient::new(cfg, args.client_id, transports);
    let mut shell = Shell {
        fs: FileSystem::new(store),
        cwd: InodeNo::ROOT,
    };

    // First client in brings up the root directory; later clients see it
    // already initialized and leave it alone.
    shell.with_lock(|sh| sh.fs.init_root());

    shell.run()?;
    Ok(())
}
