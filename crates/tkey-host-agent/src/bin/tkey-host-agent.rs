//! Host agent CLI: runs the U2F translator against a HID channel until a
//! signal arrives, or performs one-shot device probes (spec.md §5).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tkey_host_agent::attestation::AttestationKey;
use tkey_host_agent::counters::CounterStore;
use tkey_host_agent::hid::mock::MockHidChannel;
use tkey_host_agent::translator::Translator;
use tkey_host_core::connection::{AsyncReadWrite, NoPortLocator, NoopFirmwareLoader};
use tkey_host_core::DeviceClient;
use tokio_serial::SerialPortBuilderExt;

/// TKey enumerates as a USB CDC-ACM device; the baud rate is not meaningful
/// over USB but `tokio_serial` requires one to build the port settings.
const BAUD_RATE: u32 = 115_200;

fn open_serial_port(path: &str) -> std::io::Result<Box<dyn AsyncReadWrite>> {
    let port = tokio_serial::new(path, BAUD_RATE)
        .open_native_async()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(Box::new(port))
}

#[derive(Parser)]
#[command(name = "tkey-host-agent", about = "U2F HID translator for a TKey device")]
struct Args {
    /// Serial device path. If unset, the agent attempts to locate one.
    #[arg(long, global = true)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the translator loop until SIGINT/SIGTERM.
    Serve,
    /// One-shot GET_NAMEVERSION probe.
    Probe,
    /// Reports whether a device is currently reachable.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let client = DeviceClient::new(args.port, NoPortLocator, NoopFirmwareLoader, open_serial_port);

    match args.command {
        Command::Probe => {
            client.connect().await?;
            tracing::info!("device identity confirmed");
        }
        Command::Status => match client.connect().await {
            Ok(()) => println!("connected"),
            Err(e) => println!("unreachable: {e}"),
        },
        Command::Serve => {
            let attestation = dev_attestation_key()?;
            let counters_path = CounterStore::default_path()
                .unwrap_or_else(|| PathBuf::from("tkey-fido-counters.json"));
            let counters = CounterStore::open(counters_path)?;
            let translator = Translator::new(client, attestation, counters);

            let mut channel = MockHidChannel::new();
            tracing::warn!(
                "no real HidChannel wired in this development build; serving an empty mock channel"
            );

            tokio::select! {
                _ = translator.serve(&mut channel) => {}
                _ = wait_for_shutdown() => {
                    tracing::info!("shutdown signal received, closing device link");
                }
            }
        }
    }

    Ok(())
}

/// The development placeholder attestation keypair described in
/// `attestation.rs` — fixed so test registrations are reproducible. A real
/// deployment provisions a batch-issued key at manufacturing time.
fn dev_attestation_key() -> anyhow::Result<AttestationKey> {
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::EncodePrivateKey;

    let signing_key = SigningKey::from_bytes(&[0x42u8; 32].into())?;
    let pem = signing_key.to_pkcs8_pem(Default::default())?;
    Ok(AttestationKey::from_pem_and_der(&pem, vec![])?)
}

/// SIGHUP is ignored (spec.md §5); SIGINT/SIGTERM trigger a graceful exit.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::debug!("SIGHUP ignored");
                    continue;
                }
                _ = sigint.recv() => return,
                _ = sigterm.recv() => return,
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
