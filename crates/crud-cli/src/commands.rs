use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use crud_client::ClientConfig;
use crud_fs::{CrudFs, Transport};
use crud_server::{CrudServer, ServerConfig};
use crud_store::InMemoryObjectStore;

use crate::cli::*;
use crate::workload::{SimReport, Simulator};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Sim(args) => cmd_sim(args),
        Command::Extract(args) => cmd_extract(args),
    }
}

/// Open `path` for appending log lines, creating it if needed.
pub fn open_log_file(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))
}

/// Client configuration from the config file, if any, with the address and
/// port flags applied on top.
pub fn client_config(endpoint: &EndpointArgs) -> anyhow::Result<ClientConfig> {
    let mut config = match &endpoint.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(ip) = endpoint.address {
        config.server_addr.set_ip(ip);
    }
    if let Some(port) = endpoint.port {
        config.server_addr.set_port(port);
    }
    Ok(config)
}

fn server_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(max) = args.max_connections {
        if max == 0 {
            bail!("--max-connections must be at least 1");
        }
        config.max_connections = max;
    }
    Ok(config)
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = server_config(&args)?;
    println!(
        "{} Object store listening on {} (max {} connections)",
        "✓".green().bold(),
        config.bind_addr.to_string().bold(),
        config.max_connections
    );
    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(CrudServer::new(config).serve())?;
    println!("{} Server stopped.", "✓".green());
    Ok(())
}

fn cmd_sim(args: SimArgs) -> anyhow::Result<()> {
    let file = File::open(&args.workload)
        .with_context(|| format!("cannot open workload {}", args.workload.display()))?;
    let report = if args.local {
        let fs = CrudFs::local(Arc::new(InMemoryObjectStore::new()));
        run_workload(fs, BufReader::new(file))?
    } else {
        let config = client_config(&args.endpoint)?;
        println!("Connecting to {}", config.server_addr.to_string().bold());
        run_workload(CrudFs::connect(config), BufReader::new(file))?
    };
    println!(
        "{} Simulation complete: {} commands, {} bytes written, {} bytes read",
        "✓".green().bold(),
        report.lines,
        report.bytes_written,
        report.bytes_read
    );
    Ok(())
}

fn run_workload<T: Transport>(fs: CrudFs<T>, reader: BufReader<File>) -> anyhow::Result<SimReport> {
    let mut sim = Simulator::new(fs);
    match sim.run(reader) {
        Ok(report) => Ok(report),
        Err(err) => {
            eprintln!(
                "{} Simulation failed after {} commands",
                "✗".red().bold(),
                sim.report().lines
            );
            Err(err)
        }
    }
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let config = client_config(&args.endpoint)?;
    let output = args.output.clone().unwrap_or_else(|| PathBuf::from(&args.file));
    let mut fs = CrudFs::connect(config);
    let data = extract_file(&mut fs, &args.file)?;
    write_new_file(&output, &data)?;
    println!(
        "{} Extracted {} ({} bytes) to {}",
        "✓".green().bold(),
        args.file.yellow(),
        data.len(),
        output.display()
    );
    Ok(())
}

/// Mount, read `path` whole, then unmount.
pub fn extract_file<T: Transport>(fs: &mut CrudFs<T>, path: &str) -> anyhow::Result<Vec<u8>> {
    fs.mount().context("mount failed")?;
    if fs.lookup(path).is_none() {
        bail!("no such file in the file system: {path}");
    }
    let handle = fs.open(path)?;
    let mut data = vec![0u8; fs.entry(handle)?.length as usize];
    let mut filled = 0;
    while filled < data.len() {
        let n = fs.read(handle, &mut data[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    data.truncate(filled);
    fs.close(handle)?;
    fs.unmount()?;
    Ok(data)
}

/// Write `data` to a new file; an existing file is never overwritten.
pub fn write_new_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crud_store::ObjectStore;
    use std::net::SocketAddr;

    fn formatted_store_with(path: &str, data: &[u8]) -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        let mut fs = CrudFs::local(store.clone() as Arc<dyn ObjectStore>);
        fs.format().unwrap();
        let h = fs.open(path).unwrap();
        fs.write(h, data).unwrap();
        fs.unmount().unwrap();
        store
    }

    #[test]
    fn endpoint_flags_override_defaults() {
        let endpoint = EndpointArgs {
            address: Some("10.1.2.3".parse().unwrap()),
            port: Some(5000),
            config: None,
        };
        let config = client_config(&endpoint).unwrap();
        assert_eq!(config.server_addr, "10.1.2.3:5000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn endpoint_defaults() {
        let config = client_config(&EndpointArgs::default()).unwrap();
        assert_eq!(config.server_addr, crud_client::DEFAULT_ADDR);
    }

    #[test]
    fn endpoint_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "server_addr = \"192.168.0.9:1234\"\n").unwrap();
        let endpoint = EndpointArgs {
            port: Some(4321),
            config: Some(path),
            ..EndpointArgs::default()
        };
        let config = client_config(&endpoint).unwrap();
        assert_eq!(config.server_addr, "192.168.0.9:4321".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn server_config_overrides() {
        let args = ServeArgs {
            bind: Some("0.0.0.0:9000".parse().unwrap()),
            max_connections: Some(4),
            config: None,
        };
        let config = server_config(&args).unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_connections, 4);

        let zero = ServeArgs {
            bind: None,
            max_connections: Some(0),
            config: None,
        };
        assert!(server_config(&zero).is_err());
    }

    #[test]
    fn extract_reads_whole_file() {
        let store = formatted_store_with("report.txt", b"line one\nline two\n");
        let mut fs = CrudFs::local(store);
        assert_eq!(extract_file(&mut fs, "report.txt").unwrap(), b"line one\nline two\n");
        assert!(!fs.is_mounted());
    }

    #[test]
    fn extract_missing_file_fails() {
        let store = formatted_store_with("a", b"x");
        let mut fs = CrudFs::local(store.clone());
        assert!(extract_file(&mut fs, "b").is_err());
        // No object was created for the missing path.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn log_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crud.log");
        writeln!(open_log_file(&path).unwrap(), "first").unwrap();
        writeln!(open_log_file(&path).unwrap(), "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert!(open_log_file(&dir.path().join("missing/crud.log")).is_err());
    }

    #[test]
    fn write_new_file_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        write_new_file(&path, b"first").unwrap();
        assert!(write_new_file(&path, b"second").is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn sim_command_runs_locally() {
        let dir = tempfile::tempdir().unwrap();
        let workload = dir.path().join("work.txt");
        std::fs::write(&workload, "x FORMAT 0 0 :\nf WRITE 3 0 :abc\nx UNMOUNT 0 0 :\n").unwrap();
        let cli = Cli {
            command: Command::Sim(SimArgs {
                workload,
                endpoint: EndpointArgs::default(),
                local: true,
            }),
            verbose: false,
            log_file: None,
        };
        run_command(cli).unwrap();
    }

    #[test]
    fn sim_command_reports_missing_workload() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            command: Command::Sim(SimArgs {
                workload: dir.path().join("missing.txt"),
                endpoint: EndpointArgs::default(),
                local: true,
            }),
            verbose: false,
            log_file: None,
        };
        assert!(run_command(cli).is_err());
    }
}
