//! Development-only device image: runs the protocol engine over a
//! stdin/stdout byte pipe instead of real hardware, so a host agent can
//! spawn it as a child process (or connect it through a PTY) without a
//! physical TKey. Not the production firmware image (spec.md §1).

use clap::Parser;
use std::io::{Read, Write};
use tkey_device::engine::Engine;
use tkey_device::hardware::sim::{SimHardware, TouchLatch};
use tkey_device_core::Cdi;

#[derive(Parser)]
#[command(name = "tkey-device", about = "Simulated TKey U2F device app")]
struct Args {
    /// 64 hex characters (32 bytes) used as a fixed CDI, for reproducible
    /// test runs. Defaults to an all-zero CDI, which is fine for
    /// development but must never be mistaken for a real device identity.
    #[arg(long)]
    cdi_hex: Option<String>,

    /// Auto-press the touch button for every presence check, skipping the
    /// interactive prompt. Useful for scripted integration tests.
    #[arg(long)]
    auto_touch: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cdi_bytes = match &args.cdi_hex {
        Some(hex_str) => {
            let bytes = hex::decode(hex_str)?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("--cdi-hex must decode to exactly 32 bytes"))?;
            arr
        }
        None => [0u8; 32],
    };

    let touch = TouchLatch::new();
    if args.auto_touch {
        touch.press();
    }
    let hw = SimHardware::new(Cdi::new(cdi_bytes), touch.clone());
    let mut engine = Engine::new(hw);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];

    loop {
        let n = stdin.lock().read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        loop {
            if args.auto_touch {
                touch.press();
            }
            let (responses, consumed) = engine.step_bytes(&buf);
            if consumed == 0 {
                break;
            }
            buf.drain(..consumed);
            for frame in responses {
                stdout.write_all(&frame.to_bytes())?;
            }
            stdout.flush()?;
            if buf.is_empty() {
                break;
            }
        }
    }

    Ok(())
}
