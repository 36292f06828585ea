use std::process::exit;

use anyhow::Context;
use clap::{crate_authors, crate_version, App as ClapApp, Arg};
use tokio::runtime::Runtime;

use env_logger::Env;
use lxi::Device;

fn main() {
    let matches = ClapApp::new("LXI socket client")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Send SCPI commands to LXI instruments over a TCP socket")
        .arg(
            Arg::with_name("address")
                .required(true)
                .help("VISA resource string, e.g. TCPIP::192.168.1.10::5025::SOCKET"),
        )
        .arg(
            Arg::with_name("command")
                .help("SCPI command to send. Reads a single line from the instrument if omitted."),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .short('t')
                .default_value("1000")
                .help("Read timeout in milliseconds. 0 blocks until the instrument answers."),
        )
        .arg(
            Arg::with_name("no-read")
                .long("no-read")
                .short('n')
                .help("Only send the command, don't read a response"),
        )
        .arg(Arg::with_name("verbose").long("verbose").short('v').help("Log verbose output"))
        .get_matches();

    let verbose = matches.is_present("verbose");
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("lxi=debug")).init();
    } else {
        env_logger::init();
    }

    let timeout = matches.value_of("timeout").unwrap().to_string();
    let timeout = match timeout.parse::<u32>() {
        Ok(timeout) => timeout,
        Err(_) => {
            println!("Cannot parse `{}` as a timeout in milliseconds.", timeout);
            exit(1);
        }
    };

    let address = matches.value_of("address").unwrap().to_string();
    let command = matches.value_of("command").map(|x| x.to_string());
    let no_read = matches.is_present("no-read");

    let rt = Runtime::new().unwrap();
    let ret = rt.block_on(run(&address, timeout, command.as_deref(), no_read));
    if let Err(err) = ret {
        eprintln!("Error: {:#}", err);
        exit(1);
    }
}

async fn run(
    address: &str,
    timeout: u32,
    command: Option<&str>,
    no_read: bool,
) -> anyhow::Result<()> {
    let mut device = Device::open(address, timeout)
        .await
        .with_context(|| format!("Failed to open `{}`", address))?;

    let ret = match command {
        Some(command) if no_read => device.command(command).await.map(|_| None),
        Some(command) => device.query(command).await.map(Some),
        None => device.query("").await.map(Some),
    };
    let response = ret.with_context(|| format!("Request to `{}` failed", address))?;

    if let Some(response) = response {
        print!("{}", response);
    }
    device.close().await?;
    Ok(())
}
